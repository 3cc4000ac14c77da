//! Core data model types for smt_store

mod hash;
mod record;
mod version;

pub use hash::{Hash, HASH_BITS};
pub use record::Record;
pub use version::Version;
