//! In-memory object store

use crate::model::Hash;
use crate::store::blob::Blob;
use crate::store::ObjectStore;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An [`ObjectStore`] that keeps everything in process memory
///
/// Used for tests and for a service configured without a database path.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<Hash, Blob>>,
    refs: RwLock<HashMap<String, Hash>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, id: Hash, blob: &Blob) -> Result<()> {
        self.objects.write().entry(id).or_insert_with(|| blob.clone());
        Ok(())
    }

    fn get(&self, id: &Hash) -> Result<Blob> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_hex()))
    }

    fn contains(&self, id: &Hash) -> bool {
        self.objects.read().contains_key(id)
    }

    fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    fn get_ref(&self, name: &str) -> Option<Hash> {
        self.refs.read().get(name).copied()
    }

    fn set_ref(&self, name: &str, id: Hash) {
        self.refs.write().insert(name.to_string(), id);
    }

    fn remove_ref(&self, name: &str) -> bool {
        self.refs.write().remove(name).is_some()
    }

    fn list_refs(&self) -> Vec<(String, Hash)> {
        self.refs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
