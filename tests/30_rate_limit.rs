mod common;

use anyhow::Result;
use axum::{
    body::Body, http::Request, http::StatusCode, middleware as axum_middleware, routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use common::body_json;
use sitework_core::config;
use sitework_core::middleware::rate_limit::tenant_rate_limit;
use sitework_core::rate_limit::TenantRateLimiter;
use sitework_core::types::{Principal, Role};

fn app(limiter: Arc<TenantRateLimiter>) -> Router {
    Router::new()
        .route("/api/ping", get(|| async { Json(json!({"pong": true})) }))
        .layer(axum_middleware::from_fn_with_state(limiter, tenant_rate_limit))
}

fn ping_as(principal: &Principal) -> Request<Body> {
    Request::builder()
        .uri("/api/ping")
        .extension(principal.clone())
        .body(Body::empty())
        .unwrap()
}

fn header_num(response: &axum::response::Response, name: &str) -> i64 {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(-1)
}

#[tokio::test]
async fn headers_present_on_every_response() -> Result<()> {
    let limiter = Arc::new(TenantRateLimiter::new(3, Duration::from_secs(60)));
    let app = app(limiter);
    let member = Principal::new(Uuid::new_v4(), Uuid::new_v4(), Role::Supervisor);

    let first = app.clone().oneshot(ping_as(&member)).await?;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_num(&first, "x-ratelimit-limit"), 3);
    assert_eq!(header_num(&first, "x-ratelimit-remaining"), 2);
    assert!(header_num(&first, "x-ratelimit-reset") > 0);

    let second = app.oneshot(ping_as(&member)).await?;
    assert_eq!(header_num(&second, "x-ratelimit-remaining"), 1);
    Ok(())
}

#[tokio::test]
async fn denial_carries_contracted_body_and_headers() -> Result<()> {
    let limiter = Arc::new(TenantRateLimiter::new(2, Duration::from_secs(60)));
    let app = app(limiter);
    let member = Principal::new(Uuid::new_v4(), Uuid::new_v4(), Role::Supervisor);

    app.clone().oneshot(ping_as(&member)).await?;
    app.clone().oneshot(ping_as(&member)).await?;
    let denied = app.oneshot(ping_as(&member)).await?;

    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_num(&denied, "x-ratelimit-remaining"), 0);

    let body = body_json(denied).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("RATE_LIMITED"));
    assert_eq!(body["details"]["limit"], json!(2));
    assert_eq!(body["details"]["windowMs"], json!(60_000));
    assert!(body["retryAfter"].as_u64().unwrap() > 0);
    Ok(())
}

#[tokio::test]
async fn tenants_do_not_share_buckets() -> Result<()> {
    let limiter = Arc::new(TenantRateLimiter::new(1, Duration::from_secs(60)));
    let app = app(limiter);
    let tenant_a = Principal::new(Uuid::new_v4(), Uuid::new_v4(), Role::Supervisor);
    let tenant_b = Principal::new(Uuid::new_v4(), Uuid::new_v4(), Role::Supervisor);

    assert_eq!(app.clone().oneshot(ping_as(&tenant_a)).await?.status(), StatusCode::OK);
    assert_eq!(
        app.clone().oneshot(ping_as(&tenant_a)).await?.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    // A separate tenant is unaffected by the saturated bucket
    assert_eq!(app.oneshot(ping_as(&tenant_b)).await?.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_requests_pass_through() -> Result<()> {
    let limiter = Arc::new(TenantRateLimiter::new(1, Duration::from_secs(60)));
    let app = app(limiter);

    // No principal extension: the auth layer in front owns rejection
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty()).unwrap())
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
    Ok(())
}

#[tokio::test]
async fn policies_build_from_configuration() {
    // The observed endpoint-class policies are config, not algorithm
    let policies = &config::config().rate_limits;
    let auth = TenantRateLimiter::from_policy(&policies.auth);
    assert_eq!(auth.limit(), policies.auth.max_requests);
    assert_eq!(auth.window(), Duration::from_secs(policies.auth.window_secs));
}
