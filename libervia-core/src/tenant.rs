//! Tenant model: configuration record, quotas, features, and RBAC keys.
//!
//! These structs define the durable shape of `config/tenants.json` and the
//! wire shape of the admin API. Field names follow the on-disk camelCase
//! convention.

use crate::{KeyId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// STATUS AND ROLE ENUMS
// ============================================================================

/// Tenant lifecycle status.
///
/// Transitions: active <-> suspended; active/suspended -> deleted (soft,
/// data on disk retained for audit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// Tenant is active and operational
    Active,
    /// Tenant is suspended; requests are refused but data is kept
    Suspended,
    /// Tenant is soft-deleted; data is retained for audit
    Deleted,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Deleted => "deleted",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "deleted" => Ok(TenantStatus::Deleted),
            _ => Err(format!("Invalid TenantStatus: {}", s)),
        }
    }
}

/// Role attached to an auth key.
///
/// `global_admin` keys are never per-tenant; they live in the global key set
/// (`config/global.json`), so this enum only carries the tenant-scoped roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    /// May call the public cognitive API of its tenant
    Public,
    /// May additionally manage its tenant (keys, audit, metrics)
    TenantAdmin,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            KeyRole::Public => "public",
            KeyRole::TenantAdmin => "tenant_admin",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for KeyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(KeyRole::Public),
            "tenant_admin" => Ok(KeyRole::TenantAdmin),
            _ => Err(format!("Invalid KeyRole: {}", s)),
        }
    }
}

/// Auth key status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

// ============================================================================
// QUOTAS AND FEATURES
// ============================================================================

/// Per-tenant quotas. A `rate_limit_rpm` of `0` disables rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuotas {
    /// Maximum events retained in the tenant's event log
    pub max_events: u64,
    /// Maximum on-disk footprint in megabytes
    pub max_storage_mb: u64,
    /// Requests per minute; 0 means unlimited
    pub rate_limit_rpm: u32,
}

impl Default for TenantQuotas {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            max_storage_mb: 512,
            rate_limit_rpm: 600,
        }
    }
}

/// Per-tenant feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantFeatures {
    /// Whether backup creation is allowed for this tenant
    pub backup_enabled: bool,
    /// Whether snapshots must carry an HMAC signature
    pub signed_backup: bool,
}

impl Default for TenantFeatures {
    fn default() -> Self {
        Self {
            backup_enabled: true,
            signed_backup: true,
        }
    }
}

// ============================================================================
// AUTH KEYS
// ============================================================================

/// A stored RBAC key. The plaintext token is never stored; only its
/// HMAC-SHA256 (64-hex) survives creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthKey {
    pub key_id: KeyId,
    pub role: KeyRole,
    /// 64-hex HMAC-SHA256 of the token under the process pepper
    pub token_hash: String,
    pub status: KeyStatus,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Redacted view of an [`AuthKey`] for listings: everything except the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthKeySummary {
    pub key_id: KeyId,
    pub role: KeyRole,
    pub status: KeyStatus,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&AuthKey> for AuthKeySummary {
    fn from(key: &AuthKey) -> Self {
        Self {
            key_id: key.key_id.clone(),
            role: key.role,
            status: key.status,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            description: key.description.clone(),
        }
    }
}

/// Result of creating a key: the only moment the plaintext token exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedKey {
    pub key_id: KeyId,
    pub role: KeyRole,
    /// Plaintext token, returned exactly once
    pub token: String,
    pub created_at: Timestamp,
}

/// A global-admin key entry from `config/global.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAdminKey {
    pub key_id: KeyId,
    pub token_hash: String,
    pub status: KeyStatus,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// TENANT RECORD
// ============================================================================

/// Durable tenant configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub quotas: TenantQuotas,
    #[serde(default)]
    pub features: TenantFeatures,
    /// Opaque operator-supplied key/value pairs
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Deprecated plaintext token, still honored for the migration window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default)]
    pub keys: Vec<AuthKey>,
}

impl Tenant {
    /// Iterate the active keys of this tenant.
    pub fn active_keys(&self) -> impl Iterator<Item = &AuthKey> {
        self.keys.iter().filter(|k| k.status == KeyStatus::Active)
    }
}

/// On-disk shape of `config/tenants.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCatalog {
    pub version: u32,
    pub tenants: Vec<Tenant>,
    pub updated_at: Timestamp,
}

/// On-disk shape of `config/global.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default)]
    pub keys: Vec<GlobalAdminKey>,
    /// Legacy single admin token (plaintext), compared in constant time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}
