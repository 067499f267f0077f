use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::rate_limit::{RateLimitDecision, TenantRateLimiter};
use crate::types::Principal;

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    // Epoch millis; legacy RFC-date mode went away with the v1 dashboard
    if let Ok(v) = HeaderValue::from_str(&decision.reset_at.timestamp_millis().to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
}

/// Per-tenant rate limiting. Keyed by the principal's tenant id; requests
/// that reach this layer without a resolved principal pass through (the
/// auth layer in front owns rejecting those).
pub async fn tenant_rate_limit(
    State(limiter): State<Arc<TenantRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<Principal>().cloned() else {
        return next.run(request).await;
    };

    let key = principal.tenant_id.to_string();
    let decision = limiter.check(&key).await;

    if !decision.allowed {
        let error = ApiError::RateLimited {
            message: "Rate limit exceeded, please slow down".to_string(),
            retry_after_secs: decision.retry_after_secs,
            limit: decision.limit,
            window_ms: decision.window.as_millis() as u64,
            reset_in_secs: decision.retry_after_secs,
        };
        let mut response = error.into_response();
        apply_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, &decision);
    response
}
