//! Identity types for Libervia entities
//!
//! Tenant ids are normalized slugs (not UUIDs): lowercase alphanumerics and
//! single hyphens, validated by the tenancy layer before construction is
//! meaningful. Key and backup ids are opaque generated strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// STRING-BACKED ID TYPES
// ============================================================================

/// Macro to define a string-backed id newtype.
///
/// These ids serialize transparently as plain strings so the on-disk and
/// wire formats stay free of wrapper objects.
macro_rules! define_string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string as this id type.
            ///
            /// No validation happens here; callers that accept external input
            /// must validate first (see `libervia-tenancy`).
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the id, returning the underlying string.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_string_id!(TenantId, "Normalized tenant slug (e.g. `acme-corp`).");
define_string_id!(KeyId, "Identifier of an auth key within a tenant or the global key set.");
define_string_id!(BackupId, "Identifier of a persisted backup snapshot.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_round_trip() -> Result<(), serde_json::Error> {
        let id = TenantId::new("acme-corp");
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, "\"acme-corp\"");

        let back: TenantId = serde_json::from_str(&json)?;
        assert_eq!(back, id);
        Ok(())
    }

    #[test]
    fn test_display_and_debug() {
        let id = KeyId::new("key_0a1b2c");
        assert_eq!(id.to_string(), "key_0a1b2c");
        assert_eq!(format!("{:?}", id), "KeyId(key_0a1b2c)");
    }

    #[test]
    fn test_from_conversions() {
        let a: BackupId = "backup_acme_20250101-000000".into();
        let b = BackupId::new(String::from("backup_acme_20250101-000000"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), b.as_ref());
    }
}
