//! Error Types for the Gateway API
//!
//! Every HTTP error carries a stable SCREAMING_SNAKE_CASE `code` string and
//! serializes as `{error, code, message, details?, requestId?}`. Internal
//! failures are logged with the request id and surfaced as opaque 500s so
//! filesystem paths never leak.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use libervia_core::{
    AuthError, BackupError, ConfigError, LiberviaError, RegistryError, RestoreError, RuntimeError,
    StorageError, TenantError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Stable error codes of the gateway contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Tenant identity (400/403/404)
    // ========================================================================
    /// No extractor produced a tenant id for a tenant-scoped route
    MissingTenant,

    /// Extractors disagree about the tenant
    TenantConflict,

    /// The tenant id fails validation
    InvalidTenantId,

    /// The tenant does not exist (or is deleted)
    TenantNotFound,

    /// The tenant is suspended
    TenantSuspended,

    // ========================================================================
    // Auth (401/403)
    // ========================================================================
    /// The route requires a token and none was presented
    MissingToken,

    /// The presented token matches no active credential
    InvalidToken,

    /// The token is valid but its role does not cover the route
    InsufficientRole,

    /// The token belongs to a different tenant
    TenantMismatch,

    // ========================================================================
    // Throttling (429)
    // ========================================================================
    RateLimited,

    // ========================================================================
    // Backup / restore (400/404/500)
    // ========================================================================
    BackupConfigMissing,
    BackupSignatureInvalid,
    BackupHashMismatch,
    BackupFormatInvalid,
    BackupNotFound,
    RestoreRejected,
    EventlogContinuityBroken,
    RestoreConflict,
    DrProcedureError,

    // ========================================================================
    // Generic (400/404/409/500)
    // ========================================================================
    ValidationFailed,
    NotFound,
    AlreadyExists,
    InternalError,
}

impl ErrorCode {
    /// HTTP status for this code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::MissingTenant
            | ErrorCode::TenantConflict
            | ErrorCode::InvalidTenantId
            | ErrorCode::ValidationFailed
            | ErrorCode::AlreadyExists
            | ErrorCode::BackupSignatureInvalid
            | ErrorCode::BackupHashMismatch
            | ErrorCode::BackupFormatInvalid
            | ErrorCode::RestoreRejected
            | ErrorCode::EventlogContinuityBroken
            | ErrorCode::RestoreConflict
            | ErrorCode::DrProcedureError => StatusCode::BAD_REQUEST,

            ErrorCode::MissingToken | ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,

            ErrorCode::InsufficientRole
            | ErrorCode::TenantMismatch
            | ErrorCode::TenantSuspended => StatusCode::FORBIDDEN,

            ErrorCode::TenantNotFound | ErrorCode::BackupNotFound | ErrorCode::NotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::BackupConfigMissing | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short human label used for the `error` field.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCode::MissingTenant => "Tenant identifier required",
            ErrorCode::TenantConflict => "Conflicting tenant identifiers",
            ErrorCode::InvalidTenantId => "Invalid tenant id",
            ErrorCode::TenantNotFound => "Tenant not found",
            ErrorCode::TenantSuspended => "Tenant suspended",
            ErrorCode::MissingToken => "Authentication required",
            ErrorCode::InvalidToken => "Invalid token",
            ErrorCode::InsufficientRole => "Insufficient role",
            ErrorCode::TenantMismatch => "Token belongs to another tenant",
            ErrorCode::RateLimited => "Rate limit exceeded",
            ErrorCode::BackupConfigMissing => "Backup signing not configured",
            ErrorCode::BackupSignatureInvalid => "Backup signature invalid",
            ErrorCode::BackupHashMismatch => "Backup hash mismatch",
            ErrorCode::BackupFormatInvalid => "Backup format invalid",
            ErrorCode::BackupNotFound => "Backup not found",
            ErrorCode::RestoreRejected => "Restore rejected",
            ErrorCode::EventlogContinuityBroken => "Event log continuity broken",
            ErrorCode::RestoreConflict => "Restore conflict",
            ErrorCode::DrProcedureError => "DR procedure error",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::NotFound => "Not found",
            ErrorCode::AlreadyExists => "Already exists",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Render the wire form (SCREAMING_SNAKE_CASE)
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(s)) => write!(f, "{}", s),
            _ => write!(f, "{:?}", self),
        }
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.label())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn missing_tenant() -> Self {
        Self::from_code(ErrorCode::MissingTenant)
    }

    pub fn tenant_conflict(details: serde_json::Value) -> Self {
        Self::from_code(ErrorCode::TenantConflict).with_details(details)
    }

    pub fn tenant_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::TenantNotFound, format!("Tenant {} not found", id))
    }

    pub fn tenant_suspended(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TenantSuspended,
            format!("Tenant {} is suspended", id),
        )
    }

    pub fn missing_token() -> Self {
        Self::from_code(ErrorCode::MissingToken)
    }

    pub fn invalid_token() -> Self {
        Self::from_code(ErrorCode::InvalidToken)
    }

    pub fn insufficient_role() -> Self {
        Self::from_code(ErrorCode::InsufficientRole)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimited,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Wire shape: `{error, code, message, details?, requestId?}`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'static str,
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            // Log internals; the body stays opaque for 500s
            tracing::error!(
                code = %self.code,
                message = %self.message,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                "request failed"
            );
        }
        let message = if status.is_server_error() {
            ErrorCode::InternalError.label().to_string()
        } else {
            self.message.clone()
        };
        let body = ErrorBody {
            error: self.code.label(),
            code: self.code,
            message: &message,
            details: self.details.as_ref(),
            request_id: self.request_id.as_deref(),
        };
        (status, Json(&body)).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<LiberviaError> for ApiError {
    fn from(err: LiberviaError) -> Self {
        match err {
            LiberviaError::Tenant(e) => e.into(),
            LiberviaError::Auth(e) => e.into(),
            LiberviaError::Registry(e) => e.into(),
            LiberviaError::Runtime(e) => e.into(),
            LiberviaError::Storage(e) => e.into(),
            LiberviaError::Backup(e) => e.into(),
            LiberviaError::Restore(e) => e.into(),
            LiberviaError::Config(e) => e.into(),
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match &err {
            TenantError::InvalidId { .. }
            | TenantError::ReservedId { .. }
            | TenantError::PathEscape { .. }
            | TenantError::SymlinkEscape { .. } => {
                ApiError::new(ErrorCode::InvalidTenantId, err.to_string())
            }
            TenantError::NotFound { id } | TenantError::Deleted { id } => {
                ApiError::tenant_not_found(id)
            }
            TenantError::AlreadyExists { .. } => {
                ApiError::new(ErrorCode::AlreadyExists, err.to_string())
            }
            TenantError::Suspended { id } => ApiError::tenant_suspended(id),
            TenantError::InvalidTransition { .. } => {
                ApiError::new(ErrorCode::ValidationFailed, err.to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::KeyNotFound { .. } => ApiError::not_found(err.to_string()),
            AuthError::KeyAlreadyRevoked { .. } | AuthError::InvalidRole { .. } => {
                ApiError::validation(err.to_string())
            }
            AuthError::InvalidToken => ApiError::invalid_token(),
            AuthError::InsufficientRole => ApiError::insufficient_role(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NotFound { .. } => ApiError::not_found(err.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        let code = match &err {
            BackupError::ConfigMissing => ErrorCode::BackupConfigMissing,
            BackupError::NotFound { .. } => ErrorCode::BackupNotFound,
            BackupError::FormatInvalid { .. } | BackupError::UnsupportedVersion { .. } => {
                ErrorCode::BackupFormatInvalid
            }
            BackupError::SignatureInvalid => ErrorCode::BackupSignatureInvalid,
            BackupError::HashMismatch { .. } => ErrorCode::BackupHashMismatch,
            BackupError::PersistFailed { .. } => ErrorCode::InternalError,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<RestoreError> for ApiError {
    fn from(err: RestoreError) -> Self {
        match &err {
            RestoreError::Rejected { errors } => {
                ApiError::from_code(ErrorCode::RestoreRejected)
                    .with_details(serde_json::json!({ "errors": errors }))
            }
            RestoreError::ContinuityBroken { .. } => {
                ApiError::new(ErrorCode::EventlogContinuityBroken, err.to_string())
            }
            RestoreError::Conflict { .. } => {
                ApiError::new(ErrorCode::RestoreConflict, err.to_string())
            }
            RestoreError::ProcedureNotFound { .. } => ApiError::not_found(err.to_string()),
            RestoreError::Procedure { .. } | RestoreError::NotAwaitingConfirmation { .. } => {
                ApiError::new(ErrorCode::DrProcedureError, err.to_string())
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::validation(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_wire_format() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_string(&ErrorCode::TenantConflict)?,
            "\"TENANT_CONFLICT\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::EventlogContinuityBroken)?,
            "\"EVENTLOG_CONTINUITY_BROKEN\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::RateLimited)?,
            "\"RATE_LIMITED\""
        );
        Ok(())
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ErrorCode::MissingTenant.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::MissingToken.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::InsufficientRole.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::TenantSuspended.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::TenantNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_error_mapping() {
        let err: ApiError = TenantError::Suspended {
            id: libervia_core::TenantId::new("acme"),
        }
        .into();
        assert_eq!(err.code, ErrorCode::TenantSuspended);

        let err: ApiError = AuthError::InvalidToken.into();
        assert_eq!(err.code, ErrorCode::InvalidToken);

        let err: ApiError = RestoreError::Rejected {
            errors: vec!["contentHash mismatch".to_string()],
        }
        .into();
        assert_eq!(err.code, ErrorCode::RestoreRejected);
        assert!(err.details.is_some());
    }

    #[test]
    fn test_display() {
        let err = ApiError::tenant_conflict(serde_json::json!({"headerTenant": "a"}));
        assert!(format!("{}", err).starts_with("TENANT_CONFLICT"));
    }
}
