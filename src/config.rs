//! Configuration for the store and the `smt` binary.
//!
//! Loaded from `~/.config/smt/config.json` (or an explicit path). Every
//! field has a default, so an empty object is a valid config.
//!
//! # Example
//!
//! ```
//! use smt_store::Config;
//!
//! let config: Config = serde_json::from_str(r#"{ "compression_level": 9 }"#).unwrap();
//! assert_eq!(config.compression_level, 9);
//! assert!(config.sync_on_commit);
//! assert!(config.database.is_none());
//! ```

use crate::store::DEFAULT_COMPRESSION_LEVEL;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Database file. `None` keeps everything in memory.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// zstd level used for new blobs
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Flush the database file after every committed update
    #[serde(default = "default_sync_on_commit")]
    pub sync_on_commit: bool,

    /// tracing filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_sync_on_commit() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            compression_level: default_compression_level(),
            sync_on_commit: default_sync_on_commit(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Default config location (~/.config/smt/config.json)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("smt").join("config.json"))
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load from `path`, or from the default location when it exists,
    /// falling back to defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Ok(default) if default.exists() => Self::from_file(default),
            _ => Ok(Self::default()),
        }
    }
}
