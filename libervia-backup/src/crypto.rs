//! Snapshot hashing and signature verification.

use hmac::{Hmac, Mac};
use libervia_core::{
    BackupEntity, BackupError, BackupMetadata, BackupSnapshot, ConfigError, IntegrityReport,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::canonical::canonical_hash;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted backup pepper length.
const MIN_PEPPER_LEN: usize = 16;

/// HMAC key for backup signatures, distinct from the auth pepper.
#[derive(Clone)]
pub struct BackupPepper(SecretString);

impl BackupPepper {
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "LIBERVIA_BACKUP_PEPPER".to_string(),
            });
        }
        if secret.len() < MIN_PEPPER_LEN {
            return Err(ConfigError::PepperTooShort {
                min: MIN_PEPPER_LEN,
                got: secret.len(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Load from `LIBERVIA_BACKUP_PEPPER`. Required wherever backup or
    /// restore runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("LIBERVIA_BACKUP_PEPPER").map_err(|_| {
            ConfigError::MissingRequired {
                field: "LIBERVIA_BACKUP_PEPPER".to_string(),
            }
        })?;
        Self::new(raw)
    }

    fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for BackupPepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BackupPepper([REDACTED, {} chars])",
            self.0.expose_secret().len()
        )
    }
}

/// Compute the snapshot-wide content hash: SHA-256 over the canonical form
/// of the metadata plus each entity's `{entityType, dataHash}` digest pair.
pub fn compute_content_hash(
    metadata: &BackupMetadata,
    entities: &[BackupEntity],
) -> Result<String, BackupError> {
    let digests: Vec<serde_json::Value> = entities
        .iter()
        .map(|e| {
            json!({
                "dataHash": e.data_hash,
                "entityType": e.entity_type,
            })
        })
        .collect();
    canonical_hash(&json!({
        "entities": digests,
        "metadata": metadata,
    }))
}

/// HMAC-SHA256(pepper, content_hash) as 64-hex.
pub fn sign_content_hash(pepper: &BackupPepper, content_hash: &str) -> Result<String, BackupError> {
    let mut mac = HmacSha256::new_from_slice(pepper.expose().as_bytes())
        .map_err(|_| BackupError::ConfigMissing)?;
    mac.update(content_hash.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a snapshot end to end, collecting every failure instead of
/// stopping at the first. A missing pepper is a verification error, never a
/// crash. Checks run in order: per-entity `dataHash`, `contentHash`,
/// `signature`.
pub fn verify_snapshot(
    pepper: Option<&BackupPepper>,
    snapshot: &BackupSnapshot,
) -> IntegrityReport {
    let mut errors = Vec::new();

    for entity in &snapshot.entities {
        match canonical_hash(&entity.data) {
            Ok(digest) if digest == entity.data_hash => {}
            Ok(_) => errors.push(format!(
                "dataHash mismatch for entity {}",
                entity.entity_type
            )),
            Err(e) => errors.push(format!(
                "dataHash recomputation failed for entity {}: {}",
                entity.entity_type, e
            )),
        }
    }

    match compute_content_hash(&snapshot.metadata, &snapshot.entities) {
        Ok(digest) => {
            if !constant_time_eq_hex(&digest, &snapshot.content_hash) {
                errors.push("contentHash mismatch".to_string());
            }
        }
        Err(e) => errors.push(format!("contentHash recomputation failed: {}", e)),
    }

    match pepper {
        Some(pepper) => match sign_content_hash(pepper, &snapshot.content_hash) {
            Ok(expected) => {
                if !constant_time_eq_hex(&expected, &snapshot.signature) {
                    errors.push("signature verification failed".to_string());
                }
            }
            Err(e) => errors.push(format!("signature recomputation failed: {}", e)),
        },
        None => errors.push("signature not verifiable: backup pepper missing".to_string()),
    }

    if errors.is_empty() {
        IntegrityReport::ok()
    } else {
        IntegrityReport::failed(errors)
    }
}

fn constant_time_eq_hex(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        let _ = a.as_bytes().ct_eq(a.as_bytes());
        return false;
    }
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
