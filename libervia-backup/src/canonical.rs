//! Canonical JSON serialization and content hashing.
//!
//! Canonical form: keys sorted lexicographically at every object level,
//! arrays in given order, timestamps as ISO-8601 strings. `serde_json`'s
//! `Value` keeps objects in a `BTreeMap`, so round-tripping any serializable
//! value through `Value` yields exactly this form.

use libervia_core::BackupError;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serialize a value canonically (sorted keys, compact separators).
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, BackupError> {
    let value = serde_json::to_value(value).map_err(|e| BackupError::FormatInvalid {
        reason: e.to_string(),
    })?;
    serde_json::to_string(&value).map_err(|e| BackupError::FormatInvalid {
        reason: e.to_string(),
    })
}

/// SHA-256 (64-hex) over the canonical serialization of `value`.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, BackupError> {
    let body = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
