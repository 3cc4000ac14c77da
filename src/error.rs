//! Error types for smt_store

use crate::model::Hash;
use thiserror::Error;

/// Result type alias for smt_store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in smt_store operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unknown root {root} for namespace '{namespace}'")]
    UnknownRoot { namespace: String, root: Hash },

    #[error("Malformed key or value: {0}")]
    MalformedKeyOrValue(String),

    /// Two distinct keys landed on the same 256-bit path. The store refuses
    /// to overwrite the existing leaf.
    #[error("Hash collision at path {path}")]
    HashCollision { path: Hash },

    #[error("Concurrent write conflict in namespace '{namespace}': expected base {expected}, found {found}")]
    ConcurrentWriteConflict {
        namespace: String,
        expected: Hash,
        found: Hash,
    },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Stable name of the error kind, as reported across the service boundary
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnknownRoot { .. } => "unknown_root",
            Error::MalformedKeyOrValue(_) => "malformed_key_or_value",
            Error::HashCollision { .. } => "hash_collision",
            Error::ConcurrentWriteConflict { .. } => "concurrent_write_conflict",
            Error::NotFound(_) => "not_found",
            Error::Config(_) => "config",
            Error::Io(_)
            | Error::Serialization(_)
            | Error::Json(_)
            | Error::Corruption(_)
            | Error::InvalidFile(_)
            | Error::VersionMismatch { .. } => "storage",
        }
    }

    /// Whether the error indicates the store can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::HashCollision { .. } | Error::Corruption(_))
    }
}
