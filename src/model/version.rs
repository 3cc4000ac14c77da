//! Version record - one committed root in a namespace's history

use super::Hash;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// An immutable entry in a namespace's version chain
///
/// Like git commits, versions point at their parent, so the namespace ref
/// only needs to remember the newest one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Merkle root of the tree at this version
    pub root: Hash,

    /// Previous version record (`Hash::ZERO` for the first one)
    pub parent: Hash,

    /// 1 for the first committed update, then +1 per commit
    pub sequence: u64,

    /// Timestamp (unix millis)
    pub timestamp: u64,
}

impl Version {
    /// Create the first version of a namespace
    pub fn initial(root: Hash) -> Self {
        Self::new(root, Hash::ZERO, 1)
    }

    /// Create a version following `parent`
    pub fn child(root: Hash, parent: Hash, parent_sequence: u64) -> Self {
        Self::new(root, parent, parent_sequence + 1)
    }

    fn new(root: Hash, parent: Hash, sequence: u64) -> Self {
        Version {
            root,
            parent,
            sequence,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    /// Compute the version record's hash
    pub fn hash(&self) -> crate::Result<Hash> {
        let data = bincode::serialize(self)?;
        Ok(Hash::digest_many(&[b"smt:version", &data]))
    }

    /// Check if this is the first version
    pub fn is_initial(&self) -> bool {
        self.parent.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_version() {
        let root = Hash::digest(b"root");
        let version = Version::initial(root);

        assert!(version.is_initial());
        assert_eq!(version.sequence, 1);
    }

    #[test]
    fn test_child_version() {
        let root = Hash::digest(b"root");
        let parent = Hash::digest(b"parent");
        let version = Version::child(root, parent, 4);

        assert!(!version.is_initial());
        assert_eq!(version.sequence, 5);
        assert_eq!(version.parent, parent);
    }

    #[test]
    fn test_version_hash_deterministic() {
        let version = Version::initial(Hash::digest(b"root"));
        assert_eq!(version.hash().unwrap(), version.hash().unwrap());
    }
}
