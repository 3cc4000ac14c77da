//! # smt_store
//!
//! A namespaced, versioned sparse merkle tree store.
//!
//! smt_store keeps an authenticated key-value map per namespace. Every
//! committed update produces a new root; old roots stay readable, and any
//! key can be proven present or absent against any root the namespace has
//! ever had.
//!
//! ## Core Concepts
//!
//! - **Records**: Keys and values, canonically encoded as sorted JSON
//! - **Roots**: 32-byte BLAKE3 identities of a full tree state
//! - **Namespaces**: Independent trees, each with its own root history
//! - **Proofs**: Sibling paths that recompute a root without the store
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use smt_store::SmtStore;
//!
//! let store = SmtStore::in_memory();
//! let root = store.update("test", &json!({ "user_id": "1000" }), &json!({ "nonce": 1 }))?;
//!
//! let proof = store.merkle_proof("test", &json!({ "user_id": "1000" }), None)?;
//! assert_eq!(proof.root, root);
//! assert!(SmtStore::verify_proof(&proof));
//! # Ok::<(), smt_store::Error>(())
//! ```

pub mod api;
pub mod model;
pub mod registry;
pub mod store;
pub mod trie;

mod config;
mod database;
mod error;

pub use api::{Request, Response, Service};
pub use config::Config;
pub use database::SmtStore;
pub use error::{Error, Result};
pub use model::{Hash, Record, Version};
pub use registry::NamespaceRegistry;
pub use store::ObjectStore;
pub use trie::{Diff, DiffEntry, MerkleProof};

/// Database version for format compatibility
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"SMTSTORE";
