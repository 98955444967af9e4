//! Libervia Backup - Signed Snapshots, Append-Only Restore, DR
//!
//! Snapshot integrity rests on three layers: a per-entity `dataHash`, a
//! snapshot-wide `contentHash` over the canonical serialization, and an
//! HMAC `signature` under the backup pepper. Restores verify before they
//! touch anything and never overwrite an existing item.

pub mod canonical;
pub mod crypto;
pub mod dr;
pub mod repository;
pub mod restore;
pub mod service;

pub use canonical::{canonical_hash, canonical_json};
pub use crypto::{compute_content_hash, sign_content_hash, verify_snapshot, BackupPepper};
pub use dr::DrService;
pub use repository::BackupRepository;
pub use restore::{RestoreOptions, RestoreService, RestoreTarget};
pub use service::{BackupCallback, BackupService, EntityDataProvider};

/// Backup format version written by this build. Loaders accept any version
/// with the same major.
pub const FORMAT_VERSION: &str = "1.0.0";
