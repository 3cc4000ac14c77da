//! Request/response interface
//!
//! One request per operation, tagged by `"method"`:
//!
//! ```json
//! {"method": "update", "namespace": "test", "key": {"user_id": "1000"}, "value": {"nonce": 1, "balance": 10}}
//! ```
//!
//! Replies carry `"status": "ok"` plus the result fields, or
//! `"status": "error"` with a stable `kind` and a human-readable `message`.

use crate::database::SmtStore;
use crate::model::{Hash, Record};
use crate::trie::{DiffEntry, MerkleProof};
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A key/value pair in a batch update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub key: Value,
    pub value: Value,
}

/// A request to the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    Update {
        namespace: String,
        key: Value,
        value: Value,
    },
    NextRoot {
        namespace: String,
        key: Value,
        value: Value,
    },
    GetValue {
        namespace: String,
        key: Value,
        #[serde(default)]
        root: Option<Hash>,
    },
    GetMerkleProof {
        namespace: String,
        key: Value,
        #[serde(default)]
        root: Option<Hash>,
    },
    /// The proof stays loosely typed so that a proof with a malformed key
    /// or value fails verification instead of failing to parse
    VerifyProof { proof: Value },
    GetRoot { namespace: String },
    Remove { namespace: String, key: Value },
    UpdateAll {
        namespace: String,
        entries: Vec<Entry>,
    },
    History { namespace: String },
    Entries {
        namespace: String,
        #[serde(default)]
        root: Option<Hash>,
    },
    Diff {
        namespace: String,
        from: Hash,
        to: Hash,
    },
    Clear { namespace: String },
}

/// One change in a diff reply
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Added { key: Record, value: Record },
    Removed { key: Record, value: Record },
    Modified {
        key: Record,
        old_value: Record,
        new_value: Record,
    },
}

impl From<DiffEntry> for Change {
    fn from(entry: DiffEntry) -> Self {
        match entry {
            DiffEntry::Added { key, value } => Change::Added { key, value },
            DiffEntry::Removed { key, value } => Change::Removed { key, value },
            DiffEntry::Modified {
                key,
                old_value,
                new_value,
            } => Change::Modified {
                key,
                old_value,
                new_value,
            },
        }
    }
}

/// Result fields of a successful request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Root { root: Hash },
    Value { value: Option<Record>, root: Hash },
    Proof { proof: MerkleProof },
    Verified { valid: bool },
    History { roots: Vec<Hash> },
    Entries { entries: Vec<Entry>, root: Hash },
    Diff { changes: Vec<Change> },
    Cleared { cleared: bool },
}

/// A reply to a request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok(Reply),
    Error { kind: String, message: String },
}

impl Response {
    fn error(kind: &str, message: impl Into<String>) -> Self {
        Response::Error {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}

impl From<Error> for Response {
    fn from(e: Error) -> Self {
        Response::error(e.kind(), e.to_string())
    }
}

/// Dispatches requests to a [`SmtStore`]
pub struct Service {
    store: SmtStore,
}

impl Service {
    pub fn new(store: SmtStore) -> Self {
        Service { store }
    }

    pub fn store(&self) -> &SmtStore {
        &self.store
    }

    /// Handle one request given as JSON text
    pub fn handle_json(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => Response::error("bad_request", e.to_string()),
        }
    }

    /// Handle one request
    pub fn handle(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(reply) => Response::Ok(reply),
            Err(e) => e.into(),
        }
    }

    fn dispatch(&self, request: Request) -> crate::Result<Reply> {
        let store = &self.store;
        match request {
            Request::Update {
                namespace,
                key,
                value,
            } => Ok(Reply::Root {
                root: store.update(&namespace, &key, &value)?,
            }),
            Request::NextRoot {
                namespace,
                key,
                value,
            } => Ok(Reply::Root {
                root: store.next_root(&namespace, &key, &value)?,
            }),
            Request::GetValue {
                namespace,
                key,
                root,
            } => {
                let root = root.unwrap_or_else(|| store.root(&namespace));
                let value = store.get_record(&namespace, &key, Some(root))?;
                Ok(Reply::Value { value, root })
            }
            Request::GetMerkleProof {
                namespace,
                key,
                root,
            } => Ok(Reply::Proof {
                proof: store.merkle_proof(&namespace, &key, root)?,
            }),
            Request::VerifyProof { proof } => {
                let valid = match serde_json::from_value::<MerkleProof>(proof) {
                    Ok(proof) => SmtStore::verify_proof(&proof),
                    Err(e) => {
                        debug!(error = %e, "proof did not parse");
                        false
                    }
                };
                Ok(Reply::Verified { valid })
            }
            Request::GetRoot { namespace } => Ok(Reply::Root {
                root: store.root(&namespace),
            }),
            Request::Remove { namespace, key } => Ok(Reply::Root {
                root: store.remove(&namespace, &key)?,
            }),
            Request::UpdateAll { namespace, entries } => {
                let pairs: Vec<(Value, Value)> =
                    entries.into_iter().map(|e| (e.key, e.value)).collect();
                Ok(Reply::Root {
                    root: store.update_all(&namespace, &pairs)?,
                })
            }
            Request::History { namespace } => Ok(Reply::History {
                roots: store.history(&namespace),
            }),
            Request::Entries { namespace, root } => {
                let root = root.unwrap_or_else(|| store.root(&namespace));
                let entries = store
                    .entries(&namespace, Some(root))?
                    .into_iter()
                    .map(|(key, value)| Entry {
                        key: key.into(),
                        value: value.into(),
                    })
                    .collect();
                Ok(Reply::Entries { entries, root })
            }
            Request::Diff {
                namespace,
                from,
                to,
            } => Ok(Reply::Diff {
                changes: store
                    .diff(&namespace, from, to)?
                    .entries
                    .into_iter()
                    .map(Change::from)
                    .collect(),
            }),
            Request::Clear { namespace } => Ok(Reply::Cleared {
                cleared: store.clear(&namespace)?,
            }),
        }
    }
}
