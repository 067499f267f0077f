use axum::{
    body::{Body, Bytes},
    extract::{Path, Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::request_meta;
use crate::error::ApiError;
use crate::guard::TenantBoundaryGuard;
use crate::types::Principal;

// Bodies above this cap are rejected rather than buffered; the upload
// endpoints stream and are never JSON.
const MAX_SANITIZED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// State for routes protected by the full ownership chain.
#[derive(Clone)]
pub struct ProtectedResource {
    pub guard: Arc<TenantBoundaryGuard>,
    pub table: &'static str,
    pub id_param: &'static str,
}

impl ProtectedResource {
    pub fn new(guard: Arc<TenantBoundaryGuard>, table: &'static str, id_param: &'static str) -> Self {
        Self { guard, table, id_param }
    }
}

fn principal_from(request: &Request) -> Result<Principal, ApiError> {
    request
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| {
            ApiError::internal_server_error("Authentication required before boundary checks")
        })
}

/// Membership-only gate for routes that touch no single resource
/// (collection listings, search).
pub async fn require_active_membership(
    State(guard): State<Arc<TenantBoundaryGuard>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = principal_from(&request)?;
    let meta = request_meta(request.headers());

    guard.validate_active_membership(&principal, &meta).await?;

    Ok(next.run(request).await)
}

/// Full chain for resource routes: membership, ownership of the path
/// resource, enumeration throttle.
pub async fn protect_tenant_resource(
    State(state): State<ProtectedResource>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = principal_from(&request)?;
    let meta = request_meta(request.headers());

    let raw_id = params
        .get(state.id_param)
        .ok_or_else(|| ApiError::bad_request(format!("Missing {} parameter", state.id_param)))?;
    let resource_id = Uuid::parse_str(raw_id)
        .map_err(|_| ApiError::validation_error(format!("Invalid {} parameter", state.id_param)))?;

    state
        .guard
        .protect_tenant_resource(&principal, state.table, resource_id, &meta)
        .await?;

    Ok(next.run(request).await)
}

/// State for creation routes subject to a per-tenant resource quota.
#[derive(Clone)]
pub struct LimitedResource {
    pub guard: Arc<TenantBoundaryGuard>,
    pub resource_type: &'static str,
}

impl LimitedResource {
    pub fn new(guard: Arc<TenantBoundaryGuard>, resource_type: &'static str) -> Self {
        Self { guard, resource_type }
    }
}

/// Quota gate for creation routes. Fails closed: an unreachable limits
/// collaborator denies the request.
pub async fn enforce_tenant_limits(
    State(state): State<LimitedResource>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = principal_from(&request)?;
    let meta = request_meta(request.headers());

    state
        .guard
        .validate_tenant_limits(&principal, state.resource_type, &meta)
        .await?;

    Ok(next.run(request).await)
}

/// Rewrites a foreign `companyId` in JSON request bodies to the caller's
/// tenant before the handler sees it. Non-JSON bodies pass through
/// untouched; bodies over the buffer cap are rejected.
pub async fn sanitize_request_body(
    State(guard): State<Arc<TenantBoundaryGuard>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = principal_from(&request)?;
    let meta = request_meta(request.headers());

    let is_json = request
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_SANITIZED_BODY_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("Request body too large"))?;

    let rewritten: Bytes = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(mut value) => {
            let corrected = guard
                .sanitize_request_body(&principal, &mut value, &meta)
                .await?;
            if corrected {
                // Content-Length must track the rewritten payload
                let new_bytes = serde_json::to_vec(&value)
                    .map_err(|_| ApiError::internal_server_error("Failed to rewrite request body"))?;
                parts.headers.remove(CONTENT_LENGTH);
                Bytes::from(new_bytes)
            } else {
                bytes
            }
        }
        // Malformed JSON is the handler's problem, not the boundary's
        Err(_) => bytes,
    };

    let request = Request::from_parts(parts, Body::from(rewritten));
    Ok(next.run(request).await)
}
