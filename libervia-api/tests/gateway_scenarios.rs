//! End-to-end gateway scenarios.
//!
//! Each test boots an isolated gateway and drives the full middleware
//! pipeline over HTTP: tenant registration, key issuance, public API
//! calls, RBAC refusals, revocation, suspension isolation, and backup
//! tamper rejection.

mod support;

use axum::body::Body;
use axum::http::StatusCode;
use support::{empty, get, post, ExpectBuilt, TestGateway, ADMIN_TOKEN};

#[tokio::test]
async fn happy_public_auth_lists_empty_events() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("acme-corp").await;
    let token = gw.create_key("acme-corp", "public").await;

    let (status, body) = gw
        .request_json(empty(
            get("/api/v1/eventos")
                .header("x-tenant-id", "acme-corp")
                .header("authorization", format!("Bearer {}", token)),
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["eventos"], serde_json::json!([]));
    assert_eq!(body["total"], serde_json::json!(0));
    assert_eq!(body["limit"], serde_json::json!(50));
}

#[tokio::test]
async fn cross_tenant_conflict_is_refused_with_details() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("acme").await;
    gw.register_tenant("globex").await;

    let (status, body) = gw
        .request_json(empty(
            get("/api/v1/tenants/globex/eventos").header("x-tenant-id", "acme"),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["code"], serde_json::json!("TENANT_CONFLICT"));
    assert_eq!(body["details"]["headerTenant"], serde_json::json!("acme"));
    assert_eq!(body["details"]["pathTenant"], serde_json::json!("globex"));
}

#[tokio::test]
async fn public_key_cannot_reach_admin_audit() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("tenant-one").await;
    let public_token = gw.create_key("tenant-one", "public").await;

    let (status, body) = gw
        .request_json(empty(
            get("/admin/tenants/tenant-one/audit/verify")
                .header("authorization", format!("Bearer {}", public_token)),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);
    assert_eq!(body["code"], serde_json::json!("INSUFFICIENT_ROLE"));
}

#[tokio::test]
async fn tenant_admin_key_reaches_audit_surface() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("tenant-one").await;
    let admin_token = gw.create_key("tenant-one", "tenant_admin").await;

    let (status, body) = gw
        .request_json(empty(
            get("/admin/tenants/tenant-one/audit/verify")
                .header("authorization", format!("Bearer {}", admin_token)),
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["valid"], serde_json::json!(true));
}

#[tokio::test]
async fn revocation_invalidates_immediately() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("acme-corp").await;
    let token = gw.create_key("acme-corp", "public").await;

    let eventos = || {
        empty(
            get("/api/v1/eventos")
                .header("x-tenant-id", "acme-corp")
                .header("authorization", format!("Bearer {}", token)),
        )
    };

    let (status, _) = gw.request_json(eventos()).await;
    assert_eq!(status, StatusCode::OK);

    // Find the key id and revoke it
    let (_, keys) = gw
        .request_json(empty(
            get("/admin/tenants/acme-corp/keys")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    let key_id = keys["keys"][0]["keyId"]
        .as_str()
        .map(|s| s.to_string())
        .unwrap_or_default();
    assert!(!key_id.is_empty(), "{}", keys);

    let (status, _) = gw
        .request_json(empty(
            post(&format!("/admin/tenants/acme-corp/keys/{}/revoke", key_id))
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = gw.request_json(eventos()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", body);
    assert_eq!(body["code"], serde_json::json!("INVALID_TOKEN"));
}

#[tokio::test]
async fn tampered_backup_is_rejected_by_restore() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("acme-corp").await;
    let token = gw.create_key("acme-corp", "public").await;

    // Produce some state to back up
    let (status, _) = gw
        .request_json(
            post("/api/v1/observacoes")
                .header("x-tenant-id", "acme-corp")
                .header("authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"descricao":"funcionou"}"#))
                .expect_built(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, created) = gw
        .request_json(empty(
            post("/admin/tenants/acme-corp/backup")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let backup_id = created["metadata"]["backupId"]
        .as_str()
        .map(|s| s.to_string())
        .unwrap_or_default();
    assert!(!backup_id.is_empty());

    // Flip one character of contentHash on disk
    let path = gw
        .state
        .backups
        .dir()
        .join(format!("{}.json", backup_id));
    let raw = std::fs::read_to_string(&path).unwrap_or_default();
    let mut snapshot: serde_json::Value =
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
    let original = snapshot["contentHash"].as_str().unwrap_or("").to_string();
    let flipped = if original.starts_with('0') {
        format!("1{}", &original[1..])
    } else {
        format!("0{}", &original[1..])
    };
    snapshot["contentHash"] = serde_json::json!(flipped);
    if let Ok(body) = serde_json::to_vec_pretty(&snapshot) {
        if std::fs::write(&path, body).is_err() {
            panic!("failed to rewrite snapshot");
        }
    }

    let (status, body) = gw
        .request_json(
            post("/admin/restore")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                .header("content-type", "application/json")
                .body(Body::from(format!(
                    r#"{{"backupId":"{}","dryRun":true}}"#,
                    backup_id
                )))
                .expect_built(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["code"], serde_json::json!("RESTORE_REJECTED"));
    let errors = body["details"]["errors"].to_string();
    assert!(errors.contains("contentHash"), "{}", errors);
}

#[tokio::test]
async fn suspension_isolates_tenants() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("tenant-a").await;
    gw.register_tenant("tenant-b").await;
    let token_a = gw.create_key("tenant-a", "public").await;
    let token_b = gw.create_key("tenant-b", "public").await;

    let (status, _) = gw
        .request_json(empty(
            post("/admin/tenants/tenant-a/suspend")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = gw
        .request_json(empty(
            get("/api/v1/eventos")
                .header("x-tenant-id", "tenant-a")
                .header("authorization", format!("Bearer {}", token_a)),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);
    assert_eq!(body["code"], serde_json::json!("TENANT_SUSPENDED"));

    let (status, _) = gw
        .request_json(empty(
            get("/api/v1/eventos")
                .header("x-tenant-id", "tenant-b")
                .header("authorization", format!("Bearer {}", token_b)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let gw = TestGateway::boot().await;

    // Well-formed inbound id comes back verbatim
    let response = gw
        .request(empty(get("/health").header("x-request-id", "req_abc-123")))
        .await;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|h| h.to_str().ok()),
        Some("req_abc-123")
    );

    // Malformed inbound id is replaced with a UUID
    let response = gw
        .request(empty(get("/health").header("x-request-id", "not valid!!")))
        .await;
    let echoed = response
        .headers()
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_ne!(echoed, "not valid!!");
    assert!(uuid::Uuid::parse_str(&echoed).is_ok());
}

#[tokio::test]
async fn rate_limit_headers_and_429() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("tiny-quota").await;
    let token = gw.create_key("tiny-quota", "public").await;

    // Drop the tenant's limit to 2 rpm
    let (status, _) = gw
        .request_json(
            axum::http::Request::builder()
                .method("PATCH")
                .uri("/admin/tenants/tiny-quota")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"quotas":{"maxEvents":1000,"maxStorageMB":16,"rateLimitRpm":2}}"#,
                ))
                .expect_built(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let eventos = || {
        empty(
            get("/api/v1/eventos")
                .header("x-tenant-id", "tiny-quota")
                .header("authorization", format!("Bearer {}", token)),
        )
    };

    let response = gw.request(eventos()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-limit")
            .and_then(|h| h.to_str().ok()),
        Some("2")
    );
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|h| h.to_str().ok()),
        Some("1")
    );

    gw.request(eventos()).await;
    let response = gw.request(eventos()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body = support::read_json(response).await;
    assert_eq!(body["code"], serde_json::json!("RATE_LIMITED"));
}

#[tokio::test]
async fn dev_mode_tenant_passes_without_token() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("dev-tenant").await;

    // No keys, no legacy token: the public API waves the request through
    let (status, body) = gw
        .request_json(empty(get("/api/v1/eventos").header("x-tenant-id", "dev-tenant")))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    // As soon as a key exists, anonymous requests are refused
    gw.create_key("dev-tenant", "public").await;
    let (status, body) = gw
        .request_json(empty(get("/api/v1/eventos").header("x-tenant-id", "dev-tenant")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", body);
    assert_eq!(body["code"], serde_json::json!("MISSING_TOKEN"));
}

#[tokio::test]
async fn decision_flow_and_audit_chain() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("acme-corp").await;
    let token = gw.create_key("acme-corp", "public").await;

    let (status, decisao) = gw
        .request_json(
            post("/api/v1/decisoes")
                .header("x-tenant-id", "acme-corp")
                .header("authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"situacao":"pedido_reembolso","contexto":{"valor":10}}"#,
                ))
                .expect_built(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", decisao);
    let episodio_id = decisao["episodio_id"].as_str().unwrap_or("").to_string();
    assert!(!episodio_id.is_empty());

    // Episode is open, then closes exactly once
    let (status, episodio) = gw
        .request_json(empty(
            get(&format!("/api/v1/episodios/{}", episodio_id))
                .header("x-tenant-id", "acme-corp")
                .header("authorization", format!("Bearer {}", token)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(episodio["status"], serde_json::json!("aberto"));

    let (status, _) = gw
        .request_json(
            post(&format!("/api/v1/episodios/{}/encerrar", episodio_id))
                .header("x-tenant-id", "acme-corp")
                .header("authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"resultado":{"ok":true}}"#))
                .expect_built(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The event chain recorded everything and verifies
    let (status, eventos) = gw
        .request_json(empty(
            get("/api/v1/eventos")
                .header("x-tenant-id", "acme-corp")
                .header("authorization", format!("Bearer {}", token)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(eventos["total"], serde_json::json!(3));

    let (status, verification) = gw
        .request_json(empty(
            get("/admin/tenants/acme-corp/audit/verify")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["valid"], serde_json::json!(true));
    assert_eq!(verification["checkedEvents"], serde_json::json!(3));
}

#[tokio::test]
async fn admin_surfaces_require_global_admin() {
    let gw = TestGateway::boot().await;

    // No token
    let (status, body) = gw.request_json(empty(get("/admin/tenants"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], serde_json::json!("MISSING_TOKEN"));

    // Wrong token
    let (status, body) = gw
        .request_json(empty(
            get("/admin/tenants").header("authorization", "Bearer wrong-token"),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], serde_json::json!("INVALID_TOKEN"));

    // Right token
    let (status, _) = gw
        .request_json(empty(
            get("/admin/tenants").header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_and_metrics_are_open() {
    let gw = TestGateway::boot().await;

    let (status, body) = gw.request_json(empty(get("/health"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], serde_json::json!("ok"));

    let (status, _) = gw.request_json(empty(get("/health/ready"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = gw.request_json(empty(get("/metrics"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn internal_metrics_are_tenant_filtered() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("acme-corp").await;
    gw.register_tenant("globex").await;
    let token_a = gw.create_key("acme-corp", "public").await;
    let token_b = gw.create_key("globex", "public").await;

    for (tenant, token) in [("acme-corp", &token_a), ("globex", &token_b)] {
        let (status, _) = gw
            .request_json(empty(
                get("/api/v1/eventos")
                    .header("x-tenant-id", tenant)
                    .header("authorization", format!("Bearer {}", token)),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = gw
        .request(empty(
            get("/internal/tenants/acme-corp/metrics")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = match axum::body::to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => panic!("read body: {}", e),
    };
    assert!(body.contains("tenant_id=\"acme-corp\""), "{}", body);
    assert!(!body.contains("globex"), "{}", body);
}

#[tokio::test]
async fn operational_health_reports_and_mirrors_status() {
    let gw = TestGateway::boot().await;

    let (status, body) = gw
        .request_json(empty(
            get("/internal/health/operational")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    // Fresh boot: uptime check warns, overall DEGRADED, HTTP still 200
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], serde_json::json!("DEGRADED"));
    assert!(body["checks"].as_array().map(|c| c.len()).unwrap_or(0) >= 6);
}

#[tokio::test]
async fn effective_restore_round_trip_is_append_only() {
    let gw = TestGateway::boot().await;
    gw.register_tenant("acme-corp").await;
    let token = gw.create_key("acme-corp", "public").await;

    for descricao in ["primeira", "segunda"] {
        let (status, _) = gw
            .request_json(
                post("/api/v1/observacoes")
                    .header("x-tenant-id", "acme-corp")
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"descricao":"{}"}}"#, descricao)))
                    .expect_built(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, created) = gw
        .request_json(empty(
            post("/admin/tenants/acme-corp/backup")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN)),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let backup_id = created["metadata"]["backupId"].as_str().unwrap_or("");

    // Everything already exists, so an effective restore changes nothing
    let restore_body = format!(r#"{{"backupId":"{}","dryRun":false}}"#, backup_id);
    let (status, report) = gw
        .request_json(
            post("/admin/restore")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                .header("content-type", "application/json")
                .body(Body::from(restore_body.clone()))
                .expect_built(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    let outcome = &report["outcomes"]["ObservacoesDeConsequencia"];
    assert_eq!(outcome["appended"], serde_json::json!(0));
    assert_eq!(outcome["alreadyExists"], serde_json::json!(2));

    // Second run: identical result (idempotent)
    let (status, second) = gw
        .request_json(
            post("/admin/restore")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                .header("content-type", "application/json")
                .body(Body::from(restore_body))
                .expect_built(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        second["outcomes"]["ObservacoesDeConsequencia"]["alreadyExists"],
        serde_json::json!(2)
    );
}
