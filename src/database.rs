//! High-level store API
//!
//! This module provides the main entry point for interacting with smt_store.

use crate::config::Config;
use crate::model::{Hash, Record, Version};
use crate::registry::NamespaceRegistry;
use crate::store::{FileStore, MemoryStore, ObjectStore};
use crate::trie::{diff_roots, Diff, MerkleProof, SparseMerkleTree};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A namespaced, versioned sparse merkle tree store
///
/// Provides:
/// - Updates that commit a new root per namespace
/// - Root prediction without writing anything
/// - Lookups and proofs against the current or any historical root
/// - Per-namespace history
///
/// Reads take a snapshot of the root and then walk immutable nodes, so
/// they never wait on writers. Writers to one namespace are serialized;
/// writers to different namespaces are not.
pub struct SmtStore {
    store: Arc<dyn ObjectStore>,
    registry: NamespaceRegistry,
    sync_on_commit: bool,
}

impl SmtStore {
    /// Create a new database file at the given path
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_store(Arc::new(FileStore::create(path)?))
    }

    /// Open an existing database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_store(Arc::new(FileStore::open(path)?))
    }

    /// Open or create a database file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_store(Arc::new(FileStore::open_or_create(path)?))
    }

    /// Create a store that lives only in memory
    pub fn in_memory() -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        SmtStore {
            registry: NamespaceRegistry::new(store.clone()),
            store,
            sync_on_commit: false,
        }
    }

    /// Build from a loaded [`Config`]
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match &config.database {
            Some(path) => Arc::new(
                FileStore::open_or_create(path)?.with_compression_level(config.compression_level),
            ),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(store)?.sync_on_commit(config.sync_on_commit))
    }

    /// Wrap any object store, loading the namespaces it already holds
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Result<Self> {
        let registry = NamespaceRegistry::open(store.clone())?;
        Ok(SmtStore {
            store,
            registry,
            sync_on_commit: true,
        })
    }

    /// Set whether every committed update is flushed to disk
    pub fn sync_on_commit(mut self, enabled: bool) -> Self {
        self.sync_on_commit = enabled;
        self
    }

    // === Updates ===

    /// Set `key` to `value` in `namespace` and commit, returning the new root
    pub fn update<K, V>(&self, namespace: &str, key: &K, value: &V) -> Result<Hash>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let entry = (encode(key)?, Some(encode(value)?));
        self.apply(namespace, std::slice::from_ref(&entry), true)
    }

    /// Apply several updates as one version
    ///
    /// Later pairs for the same key win.
    pub fn update_all<K, V>(&self, namespace: &str, entries: &[(K, V)]) -> Result<Hash>
    where
        K: Serialize,
        V: Serialize,
    {
        let entries = encode_all(entries)?;
        self.apply(namespace, &entries, true)
    }

    /// Remove `key` from `namespace` and commit
    pub fn remove<K: Serialize + ?Sized>(&self, namespace: &str, key: &K) -> Result<Hash> {
        let entry = (encode(key)?, None);
        self.apply(namespace, std::slice::from_ref(&entry), true)
    }

    /// The root `update` would produce, without writing anything
    pub fn next_root<K, V>(&self, namespace: &str, key: &K, value: &V) -> Result<Hash>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let entry = (encode(key)?, Some(encode(value)?));
        self.apply(namespace, std::slice::from_ref(&entry), false)
    }

    /// The root `update_all` would produce, without writing anything
    pub fn next_root_all<K, V>(&self, namespace: &str, entries: &[(K, V)]) -> Result<Hash>
    where
        K: Serialize,
        V: Serialize,
    {
        let entries = encode_all(entries)?;
        self.apply(namespace, &entries, false)
    }

    // === Reads ===

    /// Current root of a namespace
    pub fn root(&self, namespace: &str) -> Hash {
        self.registry.current_root(namespace)
    }

    /// Look up `key` in the namespace's current tree
    pub fn get_value<K, V>(&self, namespace: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        self.get_record(namespace, key, None)?
            .map(|record| record.decode())
            .transpose()
    }

    /// Look up `key` as of a historical root
    pub fn get_value_at<K, V>(&self, namespace: &str, key: &K, root: Hash) -> Result<Option<V>>
    where
        K: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        self.get_record(namespace, key, Some(root))?
            .map(|record| record.decode())
            .transpose()
    }

    /// Look up the raw record under `key`, at `root` or the current root
    pub fn get_record<K: Serialize + ?Sized>(
        &self,
        namespace: &str,
        key: &K,
        root: Option<Hash>,
    ) -> Result<Option<Record>> {
        let key = encode(key)?;
        let root = self.resolve_root(namespace, root)?;
        let tree = SparseMerkleTree::from_root(self.store.as_ref(), root);
        tree.get(&key).inspect_err(|e| report(namespace, e))
    }

    /// Build an inclusion or absence proof for `key`
    pub fn merkle_proof<K: Serialize + ?Sized>(
        &self,
        namespace: &str,
        key: &K,
        root: Option<Hash>,
    ) -> Result<MerkleProof> {
        let key = encode(key)?;
        let root = self.resolve_root(namespace, root)?;
        let tree = SparseMerkleTree::from_root(self.store.as_ref(), root);
        let proof = tree.prove(&key).inspect_err(|e| report(namespace, e))?;
        debug!(
            namespace,
            root = %root.short(),
            inclusion = proof.is_inclusion(),
            siblings = proof.siblings.len(),
            "generated proof"
        );
        Ok(proof)
    }

    /// Check a proof against the root it claims
    pub fn verify_proof(proof: &MerkleProof) -> bool {
        proof.verify()
    }

    /// Every entry of the namespace at `root` or the current root
    pub fn entries(&self, namespace: &str, root: Option<Hash>) -> Result<Vec<(Record, Record)>> {
        let root = self.resolve_root(namespace, root)?;
        SparseMerkleTree::from_root(self.store.as_ref(), root).entries()
    }

    /// Changes between two roots of a namespace
    pub fn diff(&self, namespace: &str, from: Hash, to: Hash) -> Result<Diff> {
        let from = self.resolve_root(namespace, Some(from))?;
        let to = self.resolve_root(namespace, Some(to))?;
        diff_roots(self.store.as_ref(), from, to)
    }

    // === Namespaces ===

    /// Roots of a namespace, oldest to newest
    pub fn history(&self, namespace: &str) -> Vec<Hash> {
        self.registry.history(namespace)
    }

    /// Version records of a namespace, newest first
    pub fn log(&self, namespace: &str, limit: Option<usize>) -> Result<Vec<(Hash, Version)>> {
        self.registry.log(namespace, limit)
    }

    /// Namespaces with at least one committed version
    pub fn namespaces(&self) -> Vec<String> {
        self.registry.namespaces()
    }

    /// Forget a namespace's history; it restarts at the empty root
    pub fn clear(&self, namespace: &str) -> Result<bool> {
        self.registry.clear(namespace, self.sync_on_commit)
    }

    /// Flush everything to disk
    pub fn sync(&self) -> Result<()> {
        self.store.sync()
    }

    /// Rewrite the backing file with only its live objects
    pub fn compact(&self) -> Result<()> {
        self.store.compact()
    }

    // === Internal helpers ===

    fn resolve_root(&self, namespace: &str, root: Option<Hash>) -> Result<Hash> {
        match root {
            None => Ok(self.registry.current_root(namespace)),
            Some(root) if self.registry.contains_root(namespace, &root) => Ok(root),
            Some(root) => {
                warn!(namespace, root = %root.short(), "rejected unknown root");
                Err(Error::UnknownRoot {
                    namespace: namespace.to_string(),
                    root,
                })
            }
        }
    }

    /// Stage `entries` on the namespace's current tree. With `commit`, write
    /// the new nodes and publish the root; otherwise drop them.
    ///
    /// Only committing creates the namespace.
    fn apply(
        &self,
        namespace: &str,
        entries: &[(Record, Option<Record>)],
        commit: bool,
    ) -> Result<Hash> {
        let ns = commit.then(|| self.registry.namespace(namespace));
        let _writer = ns.as_ref().map(|ns| ns.lock_writer());
        let base = match &ns {
            Some(ns) => ns.current_root(),
            None => self.registry.current_root(namespace),
        };

        let mut tree = SparseMerkleTree::from_root(self.store.as_ref(), base);
        for (key, value) in entries {
            let staged = match value {
                Some(value) => tree.insert(key, value),
                None => tree.remove(key),
            };
            staged.inspect_err(|e| report(namespace, e))?;
        }

        let Some(ns) = &ns else {
            debug!(
                namespace,
                base = %base.short(),
                predicted = %tree.root_hash().short(),
                "predicted root"
            );
            return Ok(tree.root_hash());
        };

        let root = tree.commit()?;
        self.registry
            .commit(ns, base, root, self.sync_on_commit)
            .inspect_err(|e| report(namespace, e))
    }
}

fn encode<T: Serialize + ?Sized>(item: &T) -> Result<Record> {
    Record::encode(item).inspect_err(|e| warn!(error = %e, "rejected key or value"))
}

fn encode_all<K: Serialize, V: Serialize>(
    entries: &[(K, V)],
) -> Result<Vec<(Record, Option<Record>)>> {
    entries
        .iter()
        .map(|(k, v)| Ok((encode(k)?, Some(encode(v)?))))
        .collect()
}

fn report(namespace: &str, e: &Error) {
    if e.is_fatal() {
        error!(namespace, error = %e, "tree integrity failure");
    }
}
