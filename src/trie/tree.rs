//! Sparse merkle tree over a content-addressed object store

use super::node::{empty_subtree, hash_leaf, TrieNode};
use super::proof::MerkleProof;
use crate::model::{Hash, Record, HASH_BITS};
use crate::store::ObjectStore;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// A fixed-depth (256 level) sparse merkle tree
///
/// A key's position is the BLAKE3 hash of its canonical bytes, read
/// most-significant bit first from the root. Changes are staged in memory:
/// [`insert`](Self::insert) and [`remove`](Self::remove) move the root but
/// write nothing until [`commit`](Self::commit). Dropping the tree without
/// committing discards every staged node.
pub struct SparseMerkleTree<'a> {
    store: &'a dyn ObjectStore,
    /// Current (possibly uncommitted) root
    root: Hash,
    /// Nodes built by staged changes, not yet written
    pending: HashMap<Hash, TrieNode>,
}

/// Everything a walk from the root learns about one key path
pub(crate) struct PathWalk {
    /// `siblings[d]` is the off-path child of the node at depth `d`
    pub siblings: Vec<Hash>,
    /// Key and value bytes of the leaf at the end of the path
    pub leaf: Option<(Vec<u8>, Vec<u8>)>,
}

impl<'a> SparseMerkleTree<'a> {
    /// Create a new empty tree
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self::from_root(store, empty_subtree(HASH_BITS))
    }

    /// Open the tree identified by `root`
    pub fn from_root(store: &'a dyn ObjectStore, root: Hash) -> Self {
        SparseMerkleTree {
            store,
            root,
            pending: HashMap::new(),
        }
    }

    /// Get the root hash
    pub fn root_hash(&self) -> Hash {
        self.root
    }

    /// Whether there are staged nodes that have not been committed
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &Record) -> Result<Option<Record>> {
        let path = key.path();
        let walk = self.walk(&path)?;
        match walk.leaf {
            None => Ok(None),
            Some((leaf_key, value)) => {
                if leaf_key != key.as_bytes() {
                    return Err(Error::HashCollision { path });
                }
                Ok(Some(Record::from_canonical_bytes(&value)?))
            }
        }
    }

    /// Stage `key = value`, returning the new root
    pub fn insert(&mut self, key: &Record, value: &Record) -> Result<Hash> {
        self.stage(key, Some(value))
    }

    /// Stage removal of `key`, returning the new root
    pub fn remove(&mut self, key: &Record) -> Result<Hash> {
        self.stage(key, None)
    }

    /// Write every staged node still reachable from the root, children
    /// before parents, and return the root
    pub fn commit(&mut self) -> Result<Hash> {
        let mut stack = vec![self.root];
        let mut reachable = Vec::new();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.pending.remove(&id) {
                if let TrieNode::Internal { left, right } = &node {
                    stack.push(*left);
                    stack.push(*right);
                }
                reachable.push(node);
            }
        }

        for node in reachable.iter().rev() {
            self.store.put_node(node)?;
        }

        debug!(
            root = %self.root.short(),
            written = reachable.len(),
            discarded = self.pending.len(),
            "committed tree nodes"
        );
        self.pending.clear();
        Ok(self.root)
    }

    /// Build an inclusion or absence proof for `key` against the current root
    pub fn prove(&self, key: &Record) -> Result<MerkleProof> {
        let path = key.path();
        let walk = self.walk(&path)?;
        let value = match walk.leaf {
            None => None,
            Some((leaf_key, value)) => {
                if leaf_key != key.as_bytes() {
                    return Err(Error::HashCollision { path });
                }
                Some(Record::from_canonical_bytes(&value)?)
            }
        };
        Ok(MerkleProof::from_path(key.clone(), value, self.root, &walk.siblings))
    }

    /// List every entry in the tree, ordered by key path
    pub fn entries(&self) -> Result<Vec<(Record, Record)>> {
        let mut results = Vec::new();
        self.collect(self.root, HASH_BITS, &mut results)?;
        Ok(results)
    }

    // === Internal helpers ===

    fn stage(&mut self, key: &Record, value: Option<&Record>) -> Result<Hash> {
        let path = key.path();
        let walk = self.walk(&path)?;

        if let Some((leaf_key, old_value)) = &walk.leaf {
            if leaf_key.as_slice() != key.as_bytes() {
                return Err(Error::HashCollision { path });
            }
            if value.map(|v| v.as_bytes()) == Some(old_value.as_slice()) {
                return Ok(self.root);
            }
        } else if value.is_none() {
            return Ok(self.root);
        }

        let mut current = match value {
            Some(value) => {
                let leaf = TrieNode::leaf(key.as_bytes().to_vec(), value.as_bytes().to_vec());
                let id = hash_leaf(key.as_bytes(), value.as_bytes());
                self.pending.insert(id, leaf);
                id
            }
            None => empty_subtree(0),
        };

        for depth in (0..HASH_BITS).rev() {
            let sibling = walk.siblings[depth];
            let (left, right) = if path.bit(depth) {
                (sibling, current)
            } else {
                (current, sibling)
            };

            let child_empty = empty_subtree(HASH_BITS - depth - 1);
            current = if left == child_empty && right == child_empty {
                empty_subtree(HASH_BITS - depth)
            } else {
                let node = TrieNode::internal(left, right);
                let id = node.hash();
                self.pending.insert(id, node);
                id
            };
        }

        self.root = current;
        Ok(current)
    }

    pub(crate) fn walk(&self, path: &Hash) -> Result<PathWalk> {
        let mut siblings = Vec::with_capacity(HASH_BITS);
        let mut current = self.root;

        for depth in 0..HASH_BITS {
            if current == empty_subtree(HASH_BITS - depth) {
                // Everything below an empty subtree is empty
                siblings.extend((depth..HASH_BITS).map(|d| empty_subtree(HASH_BITS - d - 1)));
                return Ok(PathWalk {
                    siblings,
                    leaf: None,
                });
            }

            let node = self.load_node(&current)?;
            let bit = path.bit(depth);
            match (node.child(bit), node.child(!bit)) {
                (Some(next), Some(sibling)) => {
                    siblings.push(sibling);
                    current = next;
                }
                _ => {
                    return Err(Error::Corruption(format!(
                        "Leaf {} found at depth {}",
                        current.short(),
                        depth
                    )))
                }
            }
        }

        if current == empty_subtree(0) {
            return Ok(PathWalk {
                siblings,
                leaf: None,
            });
        }

        match self.load_node(&current)? {
            TrieNode::Leaf { key, value } => Ok(PathWalk {
                siblings,
                leaf: Some((key, value)),
            }),
            TrieNode::Internal { .. } => Err(Error::Corruption(format!(
                "Internal node {} found at leaf depth",
                current.short()
            ))),
        }
    }

    pub(crate) fn load_node(&self, id: &Hash) -> Result<TrieNode> {
        if let Some(node) = self.pending.get(id) {
            return Ok(node.clone());
        }

        let node = self.store.get_node(id)?;
        if node.hash() != *id {
            return Err(Error::Corruption(format!(
                "Node stored under {} hashes to {}",
                id.short(),
                node.hash().short()
            )));
        }
        Ok(node)
    }

    fn collect(
        &self,
        id: Hash,
        height: usize,
        results: &mut Vec<(Record, Record)>,
    ) -> Result<()> {
        if id == empty_subtree(height) {
            return Ok(());
        }

        match self.load_node(&id)? {
            TrieNode::Leaf { key, value } if height == 0 => {
                results.push((
                    Record::from_canonical_bytes(&key)?,
                    Record::from_canonical_bytes(&value)?,
                ));
            }
            TrieNode::Internal { left, right } if height > 0 => {
                self.collect(left, height - 1, results)?;
                self.collect(right, height - 1, results)?;
            }
            _ => {
                return Err(Error::Corruption(format!(
                    "Node {} has the wrong kind for height {}",
                    id.short(),
                    height
                )))
            }
        }
        Ok(())
    }
}
