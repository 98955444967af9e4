//! Global-admin key set.
//!
//! Global-admin keys are process-wide, never per-tenant. They load once at
//! boot from `<baseDir>/config/global.json`, optionally augmented by the
//! legacy `GATEWAY_ADMIN_TOKEN` environment value.

use libervia_core::{GlobalConfig, KeyId, KeyStatus, RegistryError};
use std::fs;
use std::path::Path;

use crate::security::{secure_compare, validate_token, AuthPepper};

/// Immutable view of the global-admin credentials.
pub struct GlobalAdminKeys {
    config: GlobalConfig,
    pepper: AuthPepper,
}

impl GlobalAdminKeys {
    /// Load `config/global.json` (absent file = empty key set) and the
    /// legacy admin token, if any.
    pub fn load(
        base_dir: &Path,
        pepper: AuthPepper,
        legacy_admin_token: Option<String>,
    ) -> Result<Self, RegistryError> {
        let path = base_dir.join("config").join("global.json");
        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| RegistryError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            serde_json::from_str::<GlobalConfig>(&raw).map_err(|e| RegistryError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            GlobalConfig::default()
        };

        if config.admin_token.is_none() {
            config.admin_token = legacy_admin_token;
        }
        Ok(Self { config, pepper })
    }

    /// Build from an in-memory config (tests, embedded setups).
    pub fn from_config(config: GlobalConfig, pepper: AuthPepper) -> Self {
        Self { config, pepper }
    }

    /// Validate a presented token. Keyed entries use the dual-verify hash
    /// path; the legacy token uses a constant-time plaintext compare.
    pub fn validate(&self, token: &str) -> Option<KeyId> {
        for key in &self.config.keys {
            if key.status != KeyStatus::Active {
                continue;
            }
            if validate_token(&self.pepper, token, &key.token_hash) {
                return Some(key.key_id.clone());
            }
        }
        if let Some(legacy) = &self.config.admin_token {
            if secure_compare(token, legacy) {
                return Some(KeyId::new("legacy-admin"));
            }
        }
        None
    }

    /// Whether any credential is configured at all.
    pub fn is_configured(&self) -> bool {
        self.config.admin_token.is_some()
            || self
                .config
                .keys
                .iter()
                .any(|k| k.status == KeyStatus::Active)
    }
}
