//! Route-level behavior: policy ordering, status mapping, rate-limit
//! headers, admin guarding.

use axum::body::Body;
use axum::http::{Request, StatusCode, header::RETRY_AFTER};
use serde_json::{Value, json};
use tower::ServiceExt;
use wordvault_auth::auth::tokens::TokenMetadata;
use wordvault_auth::database::entities::Role;
use wordvault_auth::rate_limit::{CategoryLimit, RateLimitConfig};
use wordvault_auth::test_utils::{TestServerBuilder, create_test_user};

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_refresh_endpoint_rotates_and_reports_rate_limit_headers() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "api_user", Role::User).await;

    let pair = server
        .token_service
        .generate_token_pair(user_id, &TokenMetadata::default())
        .await
        .unwrap();

    let app = server.build_router();
    let response = app
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": pair.refresh_token }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-RateLimit-Remaining"));
    assert!(response.headers().contains_key("X-RateLimit-Reset"));

    let body = response_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(
        body["refresh_token"]
            .as_str()
            .is_some_and(|t| t != pair.refresh_token)
    );
}

#[tokio::test]
async fn test_replayed_token_gets_generic_401() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "replay_user", Role::User).await;

    let pair = server
        .token_service
        .generate_token_pair(user_id, &TokenMetadata::default())
        .await
        .unwrap();

    let app = server.build_router();
    let first = app
        .clone()
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": pair.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let replay = app
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": pair.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    // The body must not reveal that reuse detection fired.
    let body = response_json(replay).await;
    assert_eq!(body["error"], "Invalid refresh token");
}

#[tokio::test]
async fn test_auth_category_returns_429_with_retry_after() {
    let rate_limit = RateLimitConfig {
        auth: CategoryLimit {
            max_requests: 2,
            window_secs: 900,
        },
        ..Default::default()
    };
    let server = TestServerBuilder::new().with_rate_limit(rate_limit).build().await;

    let app = server.build_router();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request(
                "/auth/refresh",
                json!({ "refresh_token": "does-not-matter" }),
            ))
            .await
            .unwrap();
        // Counted and allowed through the limiter; the token itself fails.
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let throttled = app
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": "does-not-matter" }),
        ))
        .await
        .unwrap();

    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = throttled
        .headers()
        .get(RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(retry_after, 1800);

    let body = response_json(throttled).await;
    assert_eq!(body["retry_after_secs"], 1800);
}

#[tokio::test]
async fn test_revoke_endpoint_ends_the_session() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "revoker", Role::User).await;

    let pair = server
        .token_service
        .generate_token_pair(user_id, &TokenMetadata::default())
        .await
        .unwrap();

    let app = server.build_router();
    let response = app
        .clone()
        .oneshot(json_request(
            "/auth/revoke",
            json!({ "refresh_token": pair.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let refresh = app
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": pair.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_every_session_of_the_bearer() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "logout_user", Role::User).await;

    for _ in 0..2 {
        server
            .token_service
            .generate_token_pair(user_id, &TokenMetadata::default())
            .await
            .unwrap();
    }
    let access_token = server.issuer.mint(user_id, Role::User).unwrap();

    let app = server.build_router();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header("Authorization", format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["revoked"], 2);

    assert_eq!(
        server
            .database
            .refresh_tokens()
            .count_active_for_user(user_id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_logout_without_bearer_is_401() {
    let server = TestServerBuilder::new().build().await;

    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_audit_logs_require_admin_role() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "curious_user", Role::User).await;
    let admin_id = create_test_user(&server.database, "audit_admin", Role::Admin).await;

    let app = server.build_router();

    // Unauthenticated
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/audit-logs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Authenticated but not admin
    let user_token = server.issuer.mint(user_id, Role::User).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/audit-logs")
                .header("Authorization", format!("Bearer {user_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Access denied");

    // Admin
    let admin_token = server.issuer.mint(admin_id, Role::Admin).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/audit-logs?limit=10")
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["limit"], 10);
    assert!(body["logs"].is_array());
}

#[tokio::test]
async fn test_admin_audit_logs_rejects_inverted_date_range() {
    let server = TestServerBuilder::new().build().await;
    let admin_id = create_test_user(&server.database, "range_admin", Role::Admin).await;
    let admin_token = server.issuer.mint(admin_id, Role::Admin).unwrap();

    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .uri(
                    "/admin/audit-logs?start_date=2026-01-02T00:00:00Z&end_date=2026-01-01T00:00:00Z",
                )
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_stats_aggregates_events() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "stat_user", Role::User).await;
    let admin_id = create_test_user(&server.database, "stat_admin", Role::Admin).await;

    // Two logins produce two medium events.
    for _ in 0..2 {
        server
            .token_service
            .generate_token_pair(user_id, &TokenMetadata::default())
            .await
            .unwrap();
    }

    let admin_token = server.issuer.mint(admin_id, Role::Admin).unwrap();
    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .uri("/admin/audit-logs/stats")
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["by_action"]["login"], 2);
    assert_eq!(body["by_severity"]["medium"], 2);
}

#[tokio::test]
async fn test_maintenance_cleanup_reports_counts() {
    let server = TestServerBuilder::new().build().await;
    let admin_id = create_test_user(&server.database, "janitor", Role::Admin).await;
    let admin_token = server.issuer.mint(admin_id, Role::Admin).unwrap();

    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/maintenance/cleanup")
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["expired_tokens_removed"], 0);
    assert_eq!(body["audit_records_removed"], 0);
}

#[tokio::test]
async fn test_health_endpoint_reports_components() {
    let server = TestServerBuilder::new().build().await;

    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["components"]["database"].is_object());
    assert!(body["components"]["token_issuer"].is_object());
}

#[tokio::test]
async fn test_forged_access_token_is_rejected_on_protected_routes() {
    let server = TestServerBuilder::new().build().await;
    let admin_id = create_test_user(&server.database, "target_admin", Role::Admin).await;

    // Token signed with a different secret.
    let other = TestServerBuilder::new().build().await;
    let forged = other.issuer.mint(admin_id, Role::Admin).unwrap();

    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .uri("/admin/audit-logs")
                .header("Authorization", format!("Bearer {forged}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
