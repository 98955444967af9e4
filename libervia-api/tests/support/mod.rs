//! Shared helpers for gateway integration tests.
//!
//! Each test boots a fully isolated gateway (own temp base dir, own metrics
//! registry, own peppers) and drives it through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use libervia_api::{build_state, create_gateway_router, ApiConfig, AppState, BootOptions};
use libervia_backup::BackupPepper;
use libervia_tenancy::AuthPepper;
use tempfile::TempDir;
use tower::ServiceExt;

/// Legacy global-admin token wired into every test gateway.
pub const ADMIN_TOKEN: &str = "test-global-admin-token";

pub struct TestGateway {
    /// Keeps the base dir alive for the gateway's lifetime
    _dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

impl TestGateway {
    pub async fn boot() -> Self {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => panic!("tempdir: {}", e),
        };
        let config = ApiConfig {
            base_dir: dir.path().to_path_buf(),
            admin_token: Some(ADMIN_TOKEN.to_string()),
            ..ApiConfig::default()
        };
        let auth_pepper = match AuthPepper::new("integration-test-auth-pepper".to_string()) {
            Ok(p) => p,
            Err(e) => panic!("auth pepper: {}", e),
        };
        let backup_pepper = match BackupPepper::new("integration-test-backup-pepper".to_string()) {
            Ok(p) => p,
            Err(e) => panic!("backup pepper: {}", e),
        };

        let state = match build_state(BootOptions {
            config,
            auth_pepper,
            backup_pepper: Some(backup_pepper),
        })
        .await
        {
            Ok(state) => state,
            Err(e) => panic!("boot failed: {}", e),
        };
        let router = create_gateway_router(state.clone());
        Self {
            _dir: dir,
            state,
            router,
        }
    }

    /// Fire one request at the gateway.
    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(e) => panic!("request failed: {:?}", e),
        }
    }

    /// Convenience: request + JSON body decode.
    pub async fn request_json(
        &self,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = self.request(request).await;
        let status = response.status();
        let body = read_json(response).await;
        (status, body)
    }

    /// Register a tenant through the admin API.
    pub async fn register_tenant(&self, id: &str) {
        let (status, body) = self
            .request_json(
                post("/admin/tenants")
                    .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                    .header("content-type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"id":"{}","name":"{}"}}"#,
                        id,
                        id.to_uppercase()
                    )))
                    .expect_built(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {}: {}", id, body);
    }

    /// Mint a key for a tenant; returns the plaintext token.
    pub async fn create_key(&self, id: &str, role: &str) -> String {
        let (status, body) = self
            .request_json(
                post(&format!("/admin/tenants/{}/keys", id))
                    .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"role":"{}"}}"#, role)))
                    .expect_built(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create key: {}", body);
        match body["token"].as_str() {
            Some(token) => token.to_string(),
            None => panic!("no token in {}", body),
        }
    }
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    let bytes = match axum::body::to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => panic!("failed to read body: {}", e),
    };
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

pub fn get(path: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(path)
}

pub fn post(path: &str) -> axum::http::request::Builder {
    Request::builder().method("POST").uri(path)
}

/// Small extension so builder errors read as test failures, not unwraps.
pub trait ExpectBuilt {
    fn expect_built(self) -> Request<Body>;
}

impl ExpectBuilt for Result<Request<Body>, axum::http::Error> {
    fn expect_built(self) -> Request<Body> {
        match self {
            Ok(request) => request,
            Err(e) => panic!("failed to build request: {}", e),
        }
    }
}

/// Build an empty-bodied request.
pub fn empty(builder: axum::http::request::Builder) -> Request<Body> {
    builder.body(Body::empty()).expect_built()
}
