//! Content-addressed object store
//!
//! Tree nodes and version records are stored by identity. The file backend
//! appends zstd-compressed blobs to a single file; the memory backend keeps
//! them in a map.

mod blob;
mod file_store;
mod memory;
mod traits;

pub use blob::{Blob, BlobType, DEFAULT_COMPRESSION_LEVEL};
pub use file_store::FileStore;
pub use memory::MemoryStore;
pub use traits::ObjectStore;
