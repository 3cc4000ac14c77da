//! Diff between two tree roots
//!
//! Subtrees with equal identities are skipped without being loaded, so the
//! cost follows the number of changed entries rather than the tree size.

use super::node::{empty_subtree, TrieNode};
use crate::model::{Hash, Record, HASH_BITS};
use crate::store::ObjectStore;
use crate::{Error, Result};

/// Type of change in a diff
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffEntry {
    /// Key was added
    Added { key: Record, value: Record },
    /// Key was removed
    Removed { key: Record, value: Record },
    /// Key was modified
    Modified {
        key: Record,
        old_value: Record,
        new_value: Record,
    },
}

impl DiffEntry {
    pub fn key(&self) -> &Record {
        match self {
            DiffEntry::Added { key, .. } => key,
            DiffEntry::Removed { key, .. } => key,
            DiffEntry::Modified { key, .. } => key,
        }
    }
}

/// A diff between two tree states, ordered by key path
#[derive(Clone, Debug, Default)]
pub struct Diff {
    pub entries: Vec<DiffEntry>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn added_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Added { .. }))
            .count()
    }

    pub fn removed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Removed { .. }))
            .count()
    }

    pub fn modified_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Modified { .. }))
            .count()
    }
}

/// Compute the diff between two committed roots
pub fn diff_roots(store: &dyn ObjectStore, old_root: Hash, new_root: Hash) -> Result<Diff> {
    let mut diff = Diff::default();
    diff_nodes(store, old_root, new_root, HASH_BITS, &mut diff.entries)?;
    Ok(diff)
}

fn diff_nodes(
    store: &dyn ObjectStore,
    old: Hash,
    new: Hash,
    height: usize,
    out: &mut Vec<DiffEntry>,
) -> Result<()> {
    if old == new {
        return Ok(());
    }

    if height == 0 {
        let old_leaf = load_leaf(store, old)?;
        let new_leaf = load_leaf(store, new)?;
        match (old_leaf, new_leaf) {
            (None, Some((key, value))) => out.push(DiffEntry::Added { key, value }),
            (Some((key, value)), None) => out.push(DiffEntry::Removed { key, value }),
            (Some((key, old_value)), Some((new_key, new_value))) => {
                if key != new_key {
                    return Err(Error::HashCollision { path: key.path() });
                }
                out.push(DiffEntry::Modified {
                    key,
                    old_value,
                    new_value,
                });
            }
            (None, None) => {}
        }
        return Ok(());
    }

    let (old_left, old_right) = children(store, old, height)?;
    let (new_left, new_right) = children(store, new, height)?;
    diff_nodes(store, old_left, new_left, height - 1, out)?;
    diff_nodes(store, old_right, new_right, height - 1, out)
}

fn children(store: &dyn ObjectStore, id: Hash, height: usize) -> Result<(Hash, Hash)> {
    if id == empty_subtree(height) {
        let empty = empty_subtree(height - 1);
        return Ok((empty, empty));
    }
    match store.get_node(&id)? {
        TrieNode::Internal { left, right } => Ok((left, right)),
        TrieNode::Leaf { .. } => Err(Error::Corruption(format!(
            "Leaf {} found at height {}",
            id.short(),
            height
        ))),
    }
}

fn load_leaf(store: &dyn ObjectStore, id: Hash) -> Result<Option<(Record, Record)>> {
    if id == empty_subtree(0) {
        return Ok(None);
    }
    match store.get_node(&id)? {
        TrieNode::Leaf { key, value } => Ok(Some((
            Record::from_canonical_bytes(&key)?,
            Record::from_canonical_bytes(&value)?,
        ))),
        TrieNode::Internal { .. } => Err(Error::Corruption(format!(
            "Internal node {} found at leaf height",
            id.short()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::trie::tree::tests::plant_leaf;
    use crate::trie::{empty_root, SparseMerkleTree};
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        Record::from_json(v).unwrap()
    }

    #[test]
    fn test_diff_empty_to_non_empty() {
        let store = MemoryStore::new();
        let mut trie = SparseMerkleTree::new(&store);
        trie.insert(&record(json!("a")), &record(json!(1))).unwrap();
        let root = trie.commit().unwrap();

        let diff = diff_roots(&store, empty_root(), root).unwrap();

        assert_eq!(diff.added_count(), 1);
        assert_eq!(diff.removed_count(), 0);
        assert_eq!(diff.modified_count(), 0);
    }

    #[test]
    fn test_diff_modification_and_removal() {
        let store = MemoryStore::new();
        let mut trie = SparseMerkleTree::new(&store);
        trie.insert(&record(json!("a")), &record(json!(1))).unwrap();
        trie.insert(&record(json!("b")), &record(json!(2))).unwrap();
        let root1 = trie.commit().unwrap();

        trie.insert(&record(json!("a")), &record(json!(10))).unwrap();
        trie.remove(&record(json!("b"))).unwrap();
        trie.insert(&record(json!("c")), &record(json!(3))).unwrap();
        let root2 = trie.commit().unwrap();

        let diff = diff_roots(&store, root1, root2).unwrap();
        assert_eq!(diff.added_count(), 1);
        assert_eq!(diff.removed_count(), 1);
        assert_eq!(diff.modified_count(), 1);

        let modified = diff
            .entries
            .iter()
            .find(|e| matches!(e, DiffEntry::Modified { .. }))
            .unwrap();
        assert_eq!(modified.key(), &record(json!("a")));
    }

    #[test]
    fn test_diff_same_trees() {
        let store = MemoryStore::new();
        let mut trie = SparseMerkleTree::new(&store);
        trie.insert(&record(json!("a")), &record(json!(1))).unwrap();
        let root = trie.commit().unwrap();

        assert!(diff_roots(&store, root, root).unwrap().is_empty());
    }

    #[test]
    fn test_diff_against_foreign_leaf_is_collision() {
        let store = MemoryStore::new();
        let key = record(json!("a"));
        let mut trie = SparseMerkleTree::new(&store);
        trie.insert(&key, &record(json!(1))).unwrap();
        let root = trie.commit().unwrap();

        let planted = plant_leaf(&store, &key.path(), &record(json!("b")), &record(json!(1)));

        let err = diff_roots(&store, root, planted).unwrap_err();
        assert!(matches!(err, Error::HashCollision { .. }));
        assert_eq!(err.kind(), "hash_collision");
    }
}
