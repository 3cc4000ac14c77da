//! Storage trait shared by the file and memory backends

use crate::model::{Hash, Version};
use crate::store::blob::{Blob, BlobType};
use crate::trie::TrieNode;
use crate::{Error, Result};

/// Content-addressed object storage plus a small table of named refs
///
/// Objects are immutable once written: putting an id that already exists is
/// a no-op. Refs map a namespace name to its newest version record.
pub trait ObjectStore: Send + Sync {
    /// Store a blob under `id`
    fn put(&self, id: Hash, blob: &Blob) -> Result<()>;

    /// Retrieve a blob by id
    fn get(&self, id: &Hash) -> Result<Blob>;

    /// Check if an id exists
    fn contains(&self, id: &Hash) -> bool;

    /// Get the number of objects in the store
    fn object_count(&self) -> usize;

    /// Get the version record a ref points at
    fn get_ref(&self, name: &str) -> Option<Hash>;

    /// Point a ref at a version record
    fn set_ref(&self, name: &str, id: Hash);

    /// Delete a ref, returning whether it existed
    fn remove_ref(&self, name: &str) -> bool;

    /// List all refs
    fn list_refs(&self) -> Vec<(String, Hash)>;

    /// Make everything written so far durable
    fn sync(&self) -> Result<()>;

    /// Reclaim space left behind by earlier syncs
    fn compact(&self) -> Result<()> {
        Ok(())
    }

    /// Store a tree node under its merkle identity
    fn put_node(&self, node: &TrieNode) -> Result<Hash> {
        let id = node.hash();
        if self.contains(&id) {
            return Ok(id);
        }
        let blob_type = match node {
            TrieNode::Leaf { .. } => BlobType::Leaf,
            TrieNode::Internal { .. } => BlobType::Internal,
        };
        let data = bincode::serialize(node)?;
        self.put(id, &Blob::new(blob_type, data))?;
        Ok(id)
    }

    /// Retrieve a tree node by identity
    fn get_node(&self, id: &Hash) -> Result<TrieNode> {
        let blob = self.get(id)?;
        if !matches!(blob.blob_type, BlobType::Leaf | BlobType::Internal) {
            return Err(Error::Corruption(format!(
                "Expected tree node, got {:?}",
                blob.blob_type
            )));
        }
        Ok(bincode::deserialize(&blob.data)?)
    }

    /// Store a version record and return its hash
    fn put_version(&self, version: &Version) -> Result<Hash> {
        let id = version.hash()?;
        let data = bincode::serialize(version)?;
        self.put(id, &Blob::new(BlobType::Version, data))?;
        Ok(id)
    }

    /// Retrieve a version record by hash
    fn get_version(&self, id: &Hash) -> Result<Version> {
        let blob = self.get(id)?;
        if blob.blob_type != BlobType::Version {
            return Err(Error::Corruption(format!(
                "Expected Version, got {:?}",
                blob.blob_type
            )));
        }
        Ok(bincode::deserialize(&blob.data)?)
    }
}
