//! Namespace registry
//!
//! Each namespace owns an independent tree. The registry tracks, per
//! namespace, the current root and every root it has ever committed, and
//! persists the newest version record as a ref in the object store. History
//! is rebuilt on open by walking the version chain backwards.

use crate::model::{Hash, Version};
use crate::store::ObjectStore;
use crate::trie::empty_root;
use crate::{Error, Result};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One namespace's pointer and history
pub struct Namespace {
    name: String,
    /// Held across read-base, build, persist and publish
    writer: Mutex<()>,
    state: RwLock<NamespaceState>,
}

struct NamespaceState {
    /// Newest version record, `None` until the first commit
    head: Option<Hash>,
    sequence: u64,
    /// Oldest to newest, starting with the empty root
    roots: Vec<Hash>,
    known: HashSet<Hash>,
}

impl NamespaceState {
    fn empty() -> Self {
        let root = empty_root();
        NamespaceState {
            head: None,
            sequence: 0,
            roots: vec![root],
            known: HashSet::from([root]),
        }
    }

    fn current(&self) -> Hash {
        self.roots.last().copied().unwrap_or_else(empty_root)
    }
}

impl Namespace {
    fn new(name: &str, state: NamespaceState) -> Self {
        Namespace {
            name: name.to_string(),
            writer: Mutex::new(()),
            state: RwLock::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the single-writer lock for this namespace
    pub fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Snapshot the current root
    pub fn current_root(&self) -> Hash {
        self.state.read().current()
    }

    /// Newest version record, if anything was ever committed
    pub fn head(&self) -> Option<Hash> {
        self.state.read().head
    }

    pub fn history(&self) -> Vec<Hash> {
        self.state.read().roots.clone()
    }

    pub fn contains_root(&self, root: &Hash) -> bool {
        self.state.read().known.contains(root)
    }
}

/// Maps namespace names to their trees' roots
pub struct NamespaceRegistry {
    store: Arc<dyn ObjectStore>,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
}

impl NamespaceRegistry {
    /// Start with no namespaces, ignoring any refs already in the store
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        NamespaceRegistry {
            store,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Load every namespace recorded in the store's refs
    pub fn open(store: Arc<dyn ObjectStore>) -> Result<Self> {
        let mut namespaces = HashMap::new();
        for (name, head) in store.list_refs() {
            let state = load_state(store.as_ref(), head)?;
            debug!(
                namespace = %name,
                versions = state.sequence,
                root = %state.current().short(),
                "loaded namespace"
            );
            namespaces.insert(name.clone(), Arc::new(Namespace::new(&name, state)));
        }

        Ok(NamespaceRegistry {
            store,
            namespaces: RwLock::new(namespaces),
        })
    }

    /// Get a namespace for writing, creating it empty on first reference
    pub fn namespace(&self, name: &str) -> Arc<Namespace> {
        if let Some(ns) = self.find(name) {
            return ns;
        }

        self.namespaces
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Namespace::new(name, NamespaceState::empty())))
            .clone()
    }

    /// Look up a namespace without creating it
    pub fn find(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.read().get(name).cloned()
    }

    /// Current root of a namespace
    pub fn current_root(&self, name: &str) -> Hash {
        self.find(name)
            .map(|ns| ns.current_root())
            .unwrap_or_else(empty_root)
    }

    /// Roots of a namespace, oldest to newest
    pub fn history(&self, name: &str) -> Vec<Hash> {
        self.find(name)
            .map(|ns| ns.history())
            .unwrap_or_else(|| vec![empty_root()])
    }

    /// Whether `root` was ever a root of the namespace
    pub fn contains_root(&self, name: &str, root: &Hash) -> bool {
        match self.find(name) {
            Some(ns) => ns.contains_root(root),
            None => *root == empty_root(),
        }
    }

    /// Namespaces with at least one committed version, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces
            .read()
            .values()
            .filter(|ns| ns.head().is_some())
            .map(|ns| ns.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Publish `new_root` as the namespace's current root
    ///
    /// The caller must hold the namespace's writer lock, and every node
    /// reachable from `new_root` must already be in the store. Fails with
    /// [`Error::ConcurrentWriteConflict`] when the current root is no longer
    /// `base`. Publishing the current root again records nothing.
    ///
    /// With `durable`, the store is synced before the new root becomes
    /// visible. A failed sync restores the previous ref and leaves the
    /// namespace at `base`.
    pub fn commit(
        &self,
        ns: &Namespace,
        base: Hash,
        new_root: Hash,
        durable: bool,
    ) -> Result<Hash> {
        let mut state = ns.state.write();
        let found = state.current();
        if found != base {
            return Err(Error::ConcurrentWriteConflict {
                namespace: ns.name.clone(),
                expected: base,
                found,
            });
        }
        if new_root == base {
            return Ok(base);
        }

        let version = match state.head {
            Some(parent) => Version::child(new_root, parent, state.sequence),
            None => Version::initial(new_root),
        };
        let version_id = self.store.put_version(&version)?;
        self.store.set_ref(&ns.name, version_id);
        if durable {
            if let Err(e) = self.store.sync() {
                self.restore_ref(&ns.name, state.head);
                warn!(namespace = %ns.name, error = %e, "commit not durable, rolled back");
                return Err(e);
            }
        }

        state.head = Some(version_id);
        state.sequence = version.sequence;
        state.roots.push(new_root);
        state.known.insert(new_root);

        info!(
            namespace = %ns.name,
            sequence = version.sequence,
            root = %new_root.short(),
            "committed version"
        );
        Ok(new_root)
    }

    /// Walk a namespace's version records, newest first
    pub fn log(&self, name: &str, limit: Option<usize>) -> Result<Vec<(Hash, Version)>> {
        let mut result = Vec::new();
        let mut current = self.find(name).and_then(|ns| ns.head());
        let limit = limit.unwrap_or(usize::MAX);

        while let Some(id) = current {
            if result.len() >= limit {
                break;
            }
            let version = self.store.get_version(&id)?;
            current = (!version.is_initial()).then_some(version.parent);
            result.push((id, version));
        }

        Ok(result)
    }

    /// Drop a namespace's ref and history; it restarts at the empty root
    ///
    /// Returns whether the namespace had committed anything. With `durable`,
    /// the removal is synced first and a failed sync leaves the namespace
    /// untouched.
    pub fn clear(&self, name: &str, durable: bool) -> Result<bool> {
        let Some(ns) = self.find(name) else {
            return Ok(false);
        };
        let _writer = ns.lock_writer();
        let mut state = ns.state.write();
        let Some(head) = state.head else {
            return Ok(false);
        };

        self.store.remove_ref(name);
        if durable {
            if let Err(e) = self.store.sync() {
                self.store.set_ref(name, head);
                warn!(namespace = %name, error = %e, "clear not durable, rolled back");
                return Err(e);
            }
        }
        *state = NamespaceState::empty();

        info!(namespace = %name, "cleared namespace");
        Ok(true)
    }

    fn restore_ref(&self, name: &str, previous: Option<Hash>) {
        match previous {
            Some(id) => self.store.set_ref(name, id),
            None => {
                self.store.remove_ref(name);
            }
        }
    }
}

fn load_state(store: &dyn ObjectStore, head: Hash) -> Result<NamespaceState> {
    let mut roots = Vec::new();
    let mut sequence = None;
    let mut current = head;

    loop {
        let version = store.get_version(&current)?;
        sequence.get_or_insert(version.sequence);
        roots.push(version.root);
        if version.is_initial() {
            break;
        }
        current = version.parent;
    }

    let mut state = NamespaceState::empty();
    state.head = Some(head);
    state.sequence = sequence.unwrap_or_default();
    for root in roots.into_iter().rev() {
        state.roots.push(root);
        state.known.insert(root);
    }
    Ok(state)
}
