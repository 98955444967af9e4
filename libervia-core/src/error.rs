//! Error types for Libervia operations

use crate::{BackupId, KeyId, TenantId, TenantStatus};
use thiserror::Error;

/// Tenant identity and lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TenantError {
    #[error("Invalid tenant id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Tenant id '{id}' is reserved")]
    ReservedId { id: String },

    #[error("Tenant not found: {id}")]
    NotFound { id: TenantId },

    #[error("Tenant already exists: {id}")]
    AlreadyExists { id: TenantId },

    #[error("Tenant {id} is suspended")]
    Suspended { id: TenantId },

    #[error("Tenant {id} is deleted")]
    Deleted { id: TenantId },

    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: TenantId,
        from: TenantStatus,
        to: TenantStatus,
    },

    #[error("Resolved data directory for '{id}' escapes the tenants root")]
    PathEscape { id: String },

    #[error("Symlink escape detected for tenant '{id}'")]
    SymlinkEscape { id: String },
}

/// Authentication and key management errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Key not found: {key_id}")]
    KeyNotFound { key_id: KeyId },

    #[error("Key {key_id} is already revoked")]
    KeyAlreadyRevoked { key_id: KeyId },

    #[error("Invalid role '{role}' for a tenant key")]
    InvalidRole { role: String },

    #[error("Token validation failed")]
    InvalidToken,

    #[error("Insufficient role for this operation")]
    InsufficientRole,
}

/// Registry persistence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Failed to read registry file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Registry file {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Failed to persist registry: {reason}")]
    PersistFailed { reason: String },

    #[error("Unsupported registry version {version}")]
    UnsupportedVersion { version: u32 },
}

/// Runtime cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Failed to open core instance for {tenant_id}: {reason}")]
    InstanceOpenFailed { tenant_id: TenantId, reason: String },

    #[error("Integration adapter failed for {tenant_id}: {reason}")]
    AdapterFailed { tenant_id: TenantId, reason: String },
}

/// Core storage errors (event log, entity stores).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O failure on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Corrupt store {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Event chain broken at {entry_id}: {reason}")]
    ChainBroken { entry_id: String, reason: String },
}

/// Backup creation/verification errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackupError {
    #[error("Backup pepper is not configured")]
    ConfigMissing,

    #[error("Backup not found: {backup_id}")]
    NotFound { backup_id: BackupId },

    #[error("Backup format invalid: {reason}")]
    FormatInvalid { reason: String },

    #[error("Unsupported backup format version {version}")]
    UnsupportedVersion { version: String },

    #[error("Backup signature invalid")]
    SignatureInvalid,

    #[error("Backup hash mismatch: {detail}")]
    HashMismatch { detail: String },

    #[error("Failed to persist backup: {reason}")]
    PersistFailed { reason: String },
}

/// Restore and DR errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RestoreError {
    #[error("Restore rejected: {errors:?}")]
    Rejected { errors: Vec<String> },

    #[error("Event log continuity broken: {reason}")]
    ContinuityBroken { reason: String },

    #[error("Restore conflict on {entity}: {reason}")]
    Conflict { entity: String, reason: String },

    #[error("DR procedure error: {reason}")]
    Procedure { reason: String },

    #[error("DR procedure not found: {procedure_id}")]
    ProcedureNotFound { procedure_id: String },

    #[error("DR procedure {procedure_id} is not awaiting confirmation")]
    NotAwaitingConfirmation { procedure_id: String },
}

/// Configuration errors. These are fatal at boot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Auth pepper must be at least {min} characters (got {got})")]
    PepperTooShort { min: usize, got: usize },
}

/// Umbrella error for all Libervia operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LiberviaError {
    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias used across the workspace.
pub type LiberviaResult<T> = Result<T, LiberviaError>;
