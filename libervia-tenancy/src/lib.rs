//! Libervia Tenancy - Identity, Registry, Runtime, Routing
//!
//! This crate owns the multi-tenant control plane of the gateway:
//!
//! - `security`: tenant-id validation, path-safe data-directory resolution,
//!   and the token hash/compare primitives (HMAC-SHA256 with pepper,
//!   SHA-256 legacy, constant-time equality).
//! - `registry`: the durable tenant catalog with RBAC keys and atomic,
//!   serialized JSON persistence.
//! - `runtime`: the cache of live per-tenant core instances.
//! - `router`: tenant-identifier extraction with cross-source conflict
//!   detection.
//! - `global`: the process-wide global-admin key set.

pub mod global;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod security;

pub use global::GlobalAdminKeys;
pub use registry::{RegisterTenant, TenantAuthContext, TenantRegistry, UpdateTenant};
pub use router::{ConflictDetails, TenantResolution};
pub use runtime::TenantRuntime;
pub use security::{
    generate_key_id, generate_token, hmac_token, resolve_tenant_data_dir, secure_compare,
    sha256_token, validate_tenant_id, validate_token, AuthPepper, RESERVED_TENANT_IDS,
};
