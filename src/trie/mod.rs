//! Sparse merkle tree with structural sharing across versions
//!
//! This implements a content-addressed binary tree where:
//! - Each node's hash is derived from its children's hashes
//! - Unchanged subtrees share storage across versions
//! - The root hash uniquely identifies the full set of entries

mod diff;
mod node;
mod proof;
mod tree;

pub use diff::{diff_roots, Diff, DiffEntry};
pub use node::{empty_root, empty_subtree, hash_internal, hash_leaf, TrieNode};
pub use proof::MerkleProof;
pub use tree::SparseMerkleTree;
