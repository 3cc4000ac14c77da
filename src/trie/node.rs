//! Trie node types and their identities

use crate::model::{Hash, HASH_BITS};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const LEAF_TAG: &[u8] = b"smt:leaf";
const NODE_TAG: &[u8] = b"smt:node";
const EMPTY_TAG: &[u8] = b"smt:empty";

/// A stored node in the sparse merkle tree
///
/// Empty subtrees are never stored; they are represented by
/// [`empty_subtree`] for their height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    /// A leaf at height 0, holding canonical key and value bytes
    Leaf { key: Vec<u8>, value: Vec<u8> },
    /// An internal node with left (bit 0) and right (bit 1) children
    Internal { left: Hash, right: Hash },
}

impl TrieNode {
    /// Create a leaf node
    pub fn leaf(key: Vec<u8>, value: Vec<u8>) -> Self {
        TrieNode::Leaf { key, value }
    }

    /// Create an internal node
    pub fn internal(left: Hash, right: Hash) -> Self {
        TrieNode::Internal { left, right }
    }

    /// Compute the merkle identity of this node
    pub fn hash(&self) -> Hash {
        match self {
            TrieNode::Leaf { key, value } => hash_leaf(key, value),
            TrieNode::Internal { left, right } => hash_internal(left, right),
        }
    }

    /// Pick a child by path bit
    pub fn child(&self, bit: bool) -> Option<Hash> {
        match self {
            TrieNode::Internal { left, right } => Some(if bit { *right } else { *left }),
            TrieNode::Leaf { .. } => None,
        }
    }
}

/// Identity of a leaf. The key length is hashed so that the key/value
/// boundary is unambiguous.
pub fn hash_leaf(key: &[u8], value: &[u8]) -> Hash {
    let len = (key.len() as u64).to_le_bytes();
    Hash::digest_many(&[LEAF_TAG, &len, key, value])
}

/// Identity of an internal node
pub fn hash_internal(left: &Hash, right: &Hash) -> Hash {
    Hash::digest_many(&[NODE_TAG, left.as_bytes(), right.as_bytes()])
}

/// Identity of an empty subtree of the given height (0 = leaf slot,
/// 256 = whole tree)
pub fn empty_subtree(height: usize) -> Hash {
    static TABLE: OnceLock<Vec<Hash>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut table = Vec::with_capacity(HASH_BITS + 1);
        let mut current = Hash::digest(EMPTY_TAG);
        table.push(current);
        for _ in 0..HASH_BITS {
            current = hash_internal(&current, &current);
            table.push(current);
        }
        table
    });
    table[height]
}

/// Root of a tree with no entries
pub fn empty_root() -> Hash {
    empty_subtree(HASH_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_hash_deterministic() {
        let node = TrieNode::leaf(b"key".to_vec(), b"value".to_vec());
        assert_eq!(node.hash(), node.hash());
    }

    #[test]
    fn test_different_nodes_different_hashes() {
        let n1 = TrieNode::leaf(b"key1".to_vec(), b"value".to_vec());
        let n2 = TrieNode::leaf(b"key2".to_vec(), b"value".to_vec());
        assert_ne!(n1.hash(), n2.hash());
    }

    #[test]
    fn test_leaf_boundary_is_unambiguous() {
        let a = TrieNode::leaf(b"ab".to_vec(), b"c".to_vec());
        let b = TrieNode::leaf(b"a".to_vec(), b"bc".to_vec());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_leaf_and_internal_domains_differ() {
        let l = Hash::digest(b"l");
        let r = Hash::digest(b"r");
        let mut bytes = l.as_bytes().to_vec();
        bytes.extend_from_slice(r.as_bytes());

        let internal = TrieNode::internal(l, r);
        let leaf = TrieNode::leaf(Vec::new(), bytes);
        assert_ne!(internal.hash(), leaf.hash());
    }

    #[test]
    fn test_empty_subtrees_chain() {
        for h in 0..HASH_BITS {
            let below = empty_subtree(h);
            assert_eq!(empty_subtree(h + 1), hash_internal(&below, &below));
        }
        assert_eq!(empty_root(), empty_subtree(256));
        assert_ne!(empty_subtree(0), empty_subtree(1));
    }

    #[test]
    fn test_child_selection() {
        let l = Hash::digest(b"l");
        let r = Hash::digest(b"r");
        let node = TrieNode::internal(l, r);
        assert_eq!(node.child(false), Some(l));
        assert_eq!(node.child(true), Some(r));
        assert_eq!(TrieNode::leaf(vec![], vec![]).child(true), None);
    }
}
