//! Canonical records for keys and values
//!
//! Every key and value crosses into the tree as a [`Record`]: a JSON document
//! with object keys in sorted order. Its compact serialization is the only
//! byte form ever hashed, so a Rust struct and the equivalent JSON document
//! land on the same leaf.

use super::Hash;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A canonically encoded key or value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Record {
    value: serde_json::Value,
    bytes: Vec<u8>,
}

impl Record {
    /// Encode any serializable type
    pub fn encode<T: Serialize + ?Sized>(item: &T) -> Result<Self> {
        let value = serde_json::to_value(item)
            .map_err(|e| Error::MalformedKeyOrValue(e.to_string()))?;
        Self::from_json(value)
    }

    /// Wrap a JSON document, rejecting `null`
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Err(Error::MalformedKeyOrValue(
                "null is reserved for absence".into(),
            ));
        }
        let value = sort_keys(value);
        let bytes = serde_json::to_vec(&value)
            .map_err(|e| Error::MalformedKeyOrValue(e.to_string()))?;
        Ok(Record { value, bytes })
    }

    /// Rebuild from canonical bytes read back out of a leaf
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::Corruption(format!("Leaf record is not JSON: {}", e)))?;
        let record = Self::from_json(value)?;
        if record.bytes != bytes {
            return Err(Error::Corruption("Leaf record is not canonical".into()));
        }
        Ok(record)
    }

    /// Decode into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| Error::MalformedKeyOrValue(e.to_string()))
    }

    /// The canonical byte form
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The JSON form
    pub fn as_json(&self) -> &serde_json::Value {
        &self.value
    }

    /// Position of this record in the tree when used as a key
    pub fn path(&self) -> Hash {
        Hash::digest(&self.bytes)
    }
}

/// Rebuild every object with its keys in sorted order, whether or not
/// serde_json's `preserve_order` feature is on.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

impl TryFrom<serde_json::Value> for Record {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        Record::from_json(value)
    }
}

impl From<Record> for serde_json::Value {
    fn from(record: Record) -> Self {
        record.value
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({})", String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}
