//! Tenant identity and token security primitives.
//!
//! Everything here is deliberately dependency-free of the HTTP layer so the
//! same primitives back the registry, the middleware, and the tests.

use base64::Engine;
use hmac::{Hmac, Mac};
use libervia_core::{ConfigError, KeyId, TenantError, TenantId};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted pepper length.
const MIN_PEPPER_LEN: usize = 16;

/// Tenant ids that can never be registered: they collide with gateway
/// namespaces or invite confusion in paths and logs.
pub const RESERVED_TENANT_IDS: [&str; 13] = [
    "admin",
    "system",
    "config",
    "backup",
    "logs",
    "tenants",
    "api",
    "public",
    "private",
    "internal",
    "root",
    "null",
    "undefined",
];

/// Canonical slug shape, checked after normalization.
static TENANT_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // The pattern is a literal; a compile failure would be a programming
    // error caught by the tests below.
    match Regex::new(r"^[a-z0-9][a-z0-9-]{1,48}[a-z0-9]$") {
        Ok(pattern) => pattern,
        Err(e) => unreachable!("invalid tenant id pattern: {}", e),
    }
});

// ============================================================================
// AUTH PEPPER
// ============================================================================

/// Process-wide HMAC pepper, wrapped so it can never be logged.
#[derive(Clone)]
pub struct AuthPepper(SecretString);

impl AuthPepper {
    /// Create a pepper with length validation.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "LIBERVIA_AUTH_PEPPER".to_string(),
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

    /// Load the pepper from `LIBERVIA_AUTH_PEPPER`. The process must refuse
    /// to start when this fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("LIBERVIA_AUTH_PEPPER").map_err(|_| {
            ConfigError::MissingRequired {
                field: "LIBERVIA_AUTH_PEPPER".to_string(),
            }
        })?;
        Self::new(raw)
    }

    /// Expose the secret value (only for keying the MAC).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for AuthPepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AuthPepper([REDACTED, {} chars])",
            self.0.expose_secret().len()
        )
    }
}

// ============================================================================
// TENANT ID VALIDATION
// ============================================================================

/// Lowercase and trim an id candidate. Validation runs on this form.
pub fn normalize_tenant_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Validate a tenant id candidate and return its canonical form.
///
/// Rejects short/long inputs, path metacharacters, control characters,
/// double hyphens, reserved names, and anything outside the slug pattern.
pub fn validate_tenant_id(raw: &str) -> Result<TenantId, TenantError> {
    let id = normalize_tenant_id(raw);
    let reject = |reason: &str| TenantError::InvalidId {
        id: raw.to_string(),
        reason: reason.to_string(),
    };

    if id.len() < 3 {
        return Err(reject("shorter than 3 characters"));
    }
    if id.len() > 50 {
        return Err(reject("longer than 50 characters"));
    }
    for forbidden in ["/", "\\", "..", "~", "$", "%", "\0", "\r", "\n"] {
        if id.contains(forbidden) {
            return Err(reject("contains a path or control character"));
        }
    }
    if id.contains("--") {
        return Err(reject("contains a double hyphen"));
    }
    if RESERVED_TENANT_IDS.contains(&id.as_str()) {
        return Err(TenantError::ReservedId { id });
    }
    if !TENANT_ID_PATTERN.is_match(&id) {
        return Err(reject("does not match the tenant slug pattern"));
    }
    Ok(TenantId::new(id))
}

// ============================================================================
// DATA DIRECTORY RESOLUTION
// ============================================================================

/// Resolve `<baseDir>/tenants/<id>` with containment checks.
///
/// The resolved path must sit strictly inside the tenants root. In paranoid
/// mode the physical (symlink-resolved) path is checked as well; the tenants
/// root is created if needed so it can be canonicalized. Creation of the
/// tenant directory itself stays with the caller.
pub fn resolve_tenant_data_dir(
    base_dir: &Path,
    tenant_id: &str,
    paranoid: bool,
) -> Result<PathBuf, TenantError> {
    let id = validate_tenant_id(tenant_id)?;

    let base = if base_dir.is_absolute() {
        base_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|_| TenantError::PathEscape {
                id: id.to_string(),
            })?
            .join(base_dir)
    };
    let tenants_root = base.join("tenants");
    let candidate = tenants_root.join(id.as_str());

    // Lexical containment: the candidate must be a strict child of the root.
    if !candidate.starts_with(&tenants_root) || candidate == tenants_root {
        return Err(TenantError::PathEscape {
            id: id.to_string(),
        });
    }

    if paranoid {
        fs::create_dir_all(&tenants_root).map_err(|_| TenantError::PathEscape {
            id: id.to_string(),
        })?;
        let physical_root =
            fs::canonicalize(&tenants_root).map_err(|_| TenantError::PathEscape {
                id: id.to_string(),
            })?;
        // The tenant directory may not exist yet; resolve whatever prefix
        // does and re-append the remainder.
        let physical_candidate = if candidate.exists() {
            fs::canonicalize(&candidate).map_err(|_| TenantError::SymlinkEscape {
                id: id.to_string(),
            })?
        } else {
            physical_root.join(id.as_str())
        };
        if !physical_candidate.starts_with(&physical_root)
            || physical_candidate == physical_root
        {
            return Err(TenantError::SymlinkEscape {
                id: id.to_string(),
            });
        }
    }

    Ok(candidate)
}

// ============================================================================
// TOKEN HASHING AND COMPARISON
// ============================================================================

/// HMAC-SHA256(pepper, token) as 64-hex. The primary hash for stored keys.
pub fn hmac_token(pepper: &AuthPepper, token: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(pepper.expose().as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length; this branch is unreachable but
        // must not panic on a secret-handling path.
        Err(_) => return String::new(),
    };
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// SHA-256(token) as 64-hex. Legacy hash kept for the migration window.
pub fn sha256_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Dual-verify a presented token against a stored 64-hex hash.
///
/// Accepts a match under the current HMAC scheme or the legacy SHA-256
/// scheme. Both comparisons run in constant time over the 32-byte digests;
/// a malformed stored hash triggers a dummy compare so the timing profile
/// stays flat.
pub fn validate_token(pepper: &AuthPepper, token: &str, stored_hash: &str) -> bool {
    let stored: [u8; 32] = match hex::decode(stored_hash) {
        Ok(bytes) => match bytes.try_into() {
            Ok(arr) => arr,
            Err(_) => {
                dummy_compare();
                return false;
            }
        },
        Err(_) => {
            dummy_compare();
            return false;
        }
    };

    let hmac_hex = hmac_token(pepper, token);
    let sha_hex = sha256_token(token);
    let hmac_bytes: [u8; 32] = match hex::decode(&hmac_hex).ok().and_then(|b| b.try_into().ok()) {
        Some(arr) => arr,
        None => {
            dummy_compare();
            return false;
        }
    };
    let sha_bytes: [u8; 32] = match hex::decode(&sha_hex).ok().and_then(|b| b.try_into().ok()) {
        Some(arr) => arr,
        None => {
            dummy_compare();
            return false;
        }
    };

    // Evaluate both schemes unconditionally; `|` keeps the comparison count
    // independent of which one matches.
    bool::from(hmac_bytes.as_slice().ct_eq(&stored)) | bool::from(sha_bytes.as_slice().ct_eq(&stored))
}

/// Constant-time string comparison with a dummy compare on length mismatch.
pub fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        // Burn comparable time before rejecting.
        let _ = a.as_bytes().ct_eq(a.as_bytes());
        return false;
    }
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn dummy_compare() {
    let zeros = [0u8; 32];
    let _ = zeros.as_slice().ct_eq(&zeros);
}

// ============================================================================
// TOKEN AND KEY-ID GENERATION
// ============================================================================

/// Generate a 32-byte URL-safe token. Returned to the caller exactly once;
/// only its HMAC is ever stored.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a short random key identifier.
pub fn generate_key_id() -> KeyId {
    let mut bytes = [0u8; 6];
    rand::rng().fill_bytes(&mut bytes);
    KeyId::new(format!("key_{}", hex::encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn test_pepper() -> AuthPepper {
        match AuthPepper::new("unit-test-pepper-0123456789".to_string()) {
            Ok(pepper) => pepper,
            Err(e) => panic!("test pepper should be valid: {}", e),
        }
    }

    #[test]
    fn test_pepper_rejects_short_values() {
        assert!(matches!(
            AuthPepper::new("short".to_string()),
            Err(ConfigError::PepperTooShort { .. })
        ));
        assert!(matches!(
            AuthPepper::new(String::new()),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_pepper_from_env() {
        let _lock = ENV_MUTEX.lock().expect("env mutex poisoned");
        {
            let _guard = EnvVarGuard::set("LIBERVIA_AUTH_PEPPER", None);
            assert!(AuthPepper::from_env().is_err());
        }
        {
            let _guard =
                EnvVarGuard::set("LIBERVIA_AUTH_PEPPER", Some("a-long-enough-pepper-value"));
            assert!(AuthPepper::from_env().is_ok());
        }
    }

    #[test]
    fn test_pepper_debug_is_redacted() {
        let debug = format!("{:?}", test_pepper());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("unit-test-pepper"));
    }

    #[test]
    fn test_validate_tenant_id_accepts_slugs() -> Result<(), TenantError> {
        for id in ["acme-corp", "abc", "tenant-42", "a-b-c-d"] {
            assert_eq!(validate_tenant_id(id)?.as_str(), id);
        }
        // Normalization happens before the checks
        assert_eq!(validate_tenant_id("  Acme-Corp ")?.as_str(), "acme-corp");
        Ok(())
    }

    #[test]
    fn test_validate_tenant_id_rejects_malformed() {
        let too_long = "a".repeat(51);
        for id in [
            "ab",                    // too short
            too_long.as_str(),       // too long
            "../etc",                // traversal
            "a/b-slug",              // slash
            "a\\b-slug",             // backslash
            "ten~ant",               // tilde
            "ten$ant",               // dollar
            "ten%ant",               // percent
            "ten\nant",              // newline
            "double--hyphen",        // double hyphen
            "-leading",              // bad first char
            "trailing-",             // bad last char
            "caps_not_allowed_",     // underscore
        ] {
            assert!(validate_tenant_id(id).is_err(), "should reject {:?}", id);
        }
    }

    #[test]
    fn test_validate_tenant_id_rejects_reserved() {
        for id in RESERVED_TENANT_IDS {
            assert!(matches!(
                validate_tenant_id(id),
                Err(TenantError::ReservedId { .. })
            ));
        }
    }

    #[test]
    fn test_resolve_data_dir_contained() -> Result<(), TenantError> {
        let base = tempfile::tempdir().map_err(|_| TenantError::PathEscape {
            id: "tempdir".to_string(),
        })?;
        let dir = resolve_tenant_data_dir(base.path(), "acme-corp", false)?;
        assert!(dir.starts_with(base.path().join("tenants")));
        assert!(dir.ends_with("acme-corp"));
        Ok(())
    }

    #[test]
    fn test_resolve_data_dir_rejects_traversal() {
        let base = std::path::Path::new("/var/lib/libervia");
        assert!(resolve_tenant_data_dir(base, "../escape", false).is_err());
        assert!(resolve_tenant_data_dir(base, "a/../../b", false).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_data_dir_paranoid_detects_symlink_escape(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let base = tempfile::tempdir()?;
        let outside = tempfile::tempdir()?;
        let tenants = base.path().join("tenants");
        fs::create_dir_all(&tenants)?;
        std::os::unix::fs::symlink(outside.path(), tenants.join("sneaky-one"))?;

        let result = resolve_tenant_data_dir(base.path(), "sneaky-one", true);
        assert!(matches!(result, Err(TenantError::SymlinkEscape { .. })));

        // A regular directory passes the same check
        fs::create_dir_all(tenants.join("honest-one"))?;
        assert!(resolve_tenant_data_dir(base.path(), "honest-one", true).is_ok());
        Ok(())
    }

    #[test]
    fn test_hmac_and_sha_are_64_hex() {
        let pepper = test_pepper();
        let hmac = hmac_token(&pepper, "tok");
        let sha = sha256_token("tok");
        assert_eq!(hmac.len(), 64);
        assert_eq!(sha.len(), 64);
        assert_ne!(hmac, sha);
        // Deterministic
        assert_eq!(hmac, hmac_token(&pepper, "tok"));
    }

    #[test]
    fn test_validate_token_dual_verify() {
        let pepper = test_pepper();
        let token = generate_token();

        assert!(validate_token(&pepper, &token, &hmac_token(&pepper, &token)));
        assert!(validate_token(&pepper, &token, &sha256_token(&token)));
        assert!(!validate_token(&pepper, &token, &sha256_token("other")));
        assert!(!validate_token(&pepper, &token, "not-hex"));
        assert!(!validate_token(&pepper, &token, &"ab".repeat(8)));
    }

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare("same-value", "same-value"));
        assert!(!secure_compare("same-value", "different!"));
        assert!(!secure_compare("short", "a-longer-value"));
    }

    #[test]
    fn test_generated_tokens_are_unique_and_urlsafe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43); // 32 bytes, unpadded base64
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
