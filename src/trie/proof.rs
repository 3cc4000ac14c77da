//! Inclusion and absence proofs
//!
//! A proof carries the key, the value found (or none), the root it was
//! generated against, and the sibling identities from the leaf up to the
//! root. Siblings that are empty subtrees are left out; `bitmap` bit `h` is
//! set when the sibling at height `h` is present in `siblings`.

use super::node::{empty_subtree, hash_internal, hash_leaf};
use crate::model::{Hash, Record, HASH_BITS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A merkle proof for one key against one root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The key being proven
    pub key: Record,
    /// The value at the key, or `None` for an absence proof
    pub value: Option<Record>,
    /// The root the proof claims to belong to
    pub root: Hash,
    /// Which heights carry an explicit sibling
    pub bitmap: Hash,
    /// Non-empty siblings, leaf to root
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    /// Build from the siblings collected on a walk, indexed by depth
    pub(crate) fn from_path(
        key: Record,
        value: Option<Record>,
        root: Hash,
        siblings_by_depth: &[Hash],
    ) -> Self {
        debug_assert_eq!(siblings_by_depth.len(), HASH_BITS);

        let mut bitmap = Hash::ZERO;
        let mut siblings = Vec::new();
        for height in 0..HASH_BITS {
            let sibling = siblings_by_depth[HASH_BITS - 1 - height];
            if sibling != empty_subtree(height) {
                bitmap.set_bit(height);
                siblings.push(sibling);
            }
        }

        MerkleProof {
            key,
            value,
            root,
            bitmap,
            siblings,
        }
    }

    /// Whether this proves presence (rather than absence) of the key
    pub fn is_inclusion(&self) -> bool {
        self.value.is_some()
    }

    /// Decode the proven value into a concrete type
    pub fn value_as<T: DeserializeOwned>(&self) -> crate::Result<Option<T>> {
        self.value.as_ref().map(|v| v.decode()).transpose()
    }

    /// Recompute the root from the proof alone
    ///
    /// Returns `None` when the proof is malformed: the sibling count does not
    /// match the bitmap, or an explicit sibling is an empty subtree.
    pub fn compute_root(&self) -> Option<Hash> {
        if self.siblings.len() != self.bitmap.count_ones() as usize {
            return None;
        }

        let path = self.key.path();
        let mut current = match &self.value {
            Some(value) => hash_leaf(self.key.as_bytes(), value.as_bytes()),
            None => empty_subtree(0),
        };

        let mut explicit = self.siblings.iter();
        for height in 0..HASH_BITS {
            let sibling = if self.bitmap.bit(height) {
                let sibling = *explicit.next()?;
                if sibling == empty_subtree(height) {
                    return None;
                }
                sibling
            } else {
                empty_subtree(height)
            };

            current = if path.bit(HASH_BITS - 1 - height) {
                hash_internal(&sibling, &current)
            } else {
                hash_internal(&current, &sibling)
            };
        }

        Some(current)
    }

    /// Check the proof against its own claimed root
    pub fn verify(&self) -> bool {
        self.compute_root() == Some(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::trie::SparseMerkleTree;
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        Record::from_json(v).unwrap()
    }

    fn populated(store: &MemoryStore) -> SparseMerkleTree<'_> {
        let mut trie = SparseMerkleTree::new(store);
        for i in 0..8u64 {
            trie.insert(
                &record(json!({ "user_id": i })),
                &record(json!({ "nonce": i, "balance": 1000 + i })),
            )
            .unwrap();
        }
        trie.commit().unwrap();
        trie
    }

    #[test]
    fn test_inclusion_proof_verifies() {
        let store = MemoryStore::new();
        let trie = populated(&store);

        let proof = trie.prove(&record(json!({ "user_id": 3 }))).unwrap();
        assert!(proof.is_inclusion());
        assert_eq!(proof.root, trie.root_hash());
        assert!(proof.verify());
    }

    #[test]
    fn test_absence_proof_verifies() {
        let store = MemoryStore::new();
        let trie = populated(&store);

        let proof = trie.prove(&record(json!({ "user_id": 99 }))).unwrap();
        assert!(!proof.is_inclusion());
        assert!(proof.verify());
    }

    #[test]
    fn test_empty_tree_proof() {
        let store = MemoryStore::new();
        let trie = SparseMerkleTree::new(&store);

        let proof = trie.prove(&record(json!("anything"))).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(proof.bitmap.is_zero());
        assert!(proof.verify());
    }

    #[test]
    fn test_tampered_sibling_fails() {
        let store = MemoryStore::new();
        let trie = populated(&store);
        let proof = trie.prove(&record(json!({ "user_id": 5 }))).unwrap();
        assert!(!proof.siblings.is_empty());

        for i in 0..proof.siblings.len() {
            let mut bad = proof.clone();
            bad.siblings[i] = Hash::digest(b"forged");
            assert!(!bad.verify(), "sibling {} accepted after tampering", i);
        }
    }

    #[test]
    fn test_tampered_root_fails() {
        let store = MemoryStore::new();
        let trie = populated(&store);
        let mut proof = trie.prove(&record(json!({ "user_id": 5 }))).unwrap();

        proof.root = Hash::digest(b"forged root");
        assert!(!proof.verify());
    }

    #[test]
    fn test_tampered_value_fails() {
        let store = MemoryStore::new();
        let trie = populated(&store);
        let mut proof = trie.prove(&record(json!({ "user_id": 5 }))).unwrap();

        proof.value = Some(record(json!({ "nonce": 5, "balance": 1 })));
        assert!(!proof.verify());

        proof.value = None;
        assert!(!proof.verify());
    }

    #[test]
    fn test_forged_presence_of_absent_key_fails() {
        let store = MemoryStore::new();
        let trie = populated(&store);
        let mut proof = trie.prove(&record(json!({ "user_id": 42 }))).unwrap();

        proof.value = Some(record(json!({ "nonce": 0, "balance": 0 })));
        assert!(!proof.verify());
    }

    #[test]
    fn test_malformed_bitmap_fails() {
        let store = MemoryStore::new();
        let trie = populated(&store);
        let proof = trie.prove(&record(json!({ "user_id": 1 }))).unwrap();

        let mut extra = proof.clone();
        extra.siblings.push(Hash::digest(b"extra"));
        assert!(!extra.verify());

        // An explicit sibling equal to the empty subtree is not canonical
        let mut padded = proof.clone();
        let free_height = (0..HASH_BITS).find(|h| !proof.bitmap.bit(*h)).unwrap();
        padded.bitmap.set_bit(free_height);
        let position = (0..free_height).filter(|h| proof.bitmap.bit(*h)).count();
        padded.siblings.insert(position, empty_subtree(free_height));
        assert_eq!(padded.compute_root(), None);
    }

    #[test]
    fn test_json_roundtrip_keeps_validity() {
        let store = MemoryStore::new();
        let trie = populated(&store);
        let proof = trie.prove(&record(json!({ "user_id": 2 }))).unwrap();

        let json = serde_json::to_string(&proof).unwrap();
        let back: MerkleProof = serde_json::from_str(&json).unwrap();
        assert_eq!(back, proof);
        assert!(back.verify());
    }

    #[test]
    fn test_value_as() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Account {
            nonce: u64,
            balance: u64,
        }

        let store = MemoryStore::new();
        let trie = populated(&store);
        let proof = trie.prove(&record(json!({ "user_id": 4 }))).unwrap();

        assert_eq!(
            proof.value_as::<Account>().unwrap(),
            Some(Account {
                nonce: 4,
                balance: 1004
            })
        );
    }
}
