#![allow(dead_code)]

use axum::{
    body::Body,
    extract::Path,
    http::Request,
    middleware as axum_middleware,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use sitework_core::audit::memory::MemoryAuditSink;
use sitework_core::guard::{
    MemoryLimitChecker, MemoryMembershipStore, MemoryResourceDirectory, TenantBoundaryGuard,
};
use sitework_core::middleware::tenant_boundary::{
    self, LimitedResource, ProtectedResource,
};
use sitework_core::permissions::{MemoryPermissionStore, PermissionEngine};
use sitework_core::types::{Membership, MembershipStatus, Principal, Role};

/// Pin the boundary tunables before the config singleton is first read.
/// Every suite in a binary sets the same values, so call order is free.
pub fn init() {
    std::env::set_var("SECURITY_ENUMERATION_THRESHOLD", "5");
    std::env::set_var("SECURITY_ENUMERATION_WINDOW_SECS", "300");
    let _ = sitework_core::config::config();
}

/// Full in-memory wiring of the boundary subsystem.
pub struct TestEnv {
    pub audit: Arc<MemoryAuditSink>,
    pub memberships: Arc<MemoryMembershipStore>,
    pub resources: Arc<MemoryResourceDirectory>,
    pub limits: Arc<MemoryLimitChecker>,
    pub permissions: Arc<MemoryPermissionStore>,
    pub guard: Arc<TenantBoundaryGuard>,
    pub engine: Arc<PermissionEngine>,
}

impl TestEnv {
    pub fn new() -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let memberships = Arc::new(MemoryMembershipStore::new());
        let resources = Arc::new(MemoryResourceDirectory::new());
        let limits = Arc::new(MemoryLimitChecker::new());
        let permissions = Arc::new(MemoryPermissionStore::new());

        let guard = Arc::new(TenantBoundaryGuard::new(
            memberships.clone(),
            resources.clone(),
            limits.clone(),
            audit.clone(),
        ));
        let engine = Arc::new(PermissionEngine::new(permissions.clone(), audit.clone()));

        Self {
            audit,
            memberships,
            resources,
            limits,
            permissions,
            guard,
            engine,
        }
    }

    /// Seed an active member and return their principal.
    pub async fn active_member(&self, tenant_id: Uuid, role: Role) -> Principal {
        let principal = Principal::new(Uuid::new_v4(), tenant_id, role);
        self.memberships
            .upsert(Membership {
                user_id: principal.user_id,
                tenant_id,
                role,
                status: MembershipStatus::Active,
            })
            .await;
        principal
    }

    pub fn superadmin(&self) -> Principal {
        Principal::new(Uuid::new_v4(), Uuid::new_v4(), Role::Superadmin)
    }
}

/// Router guarding GET /projects/:id with the full ownership chain.
pub fn resource_router(env: &TestEnv) -> Router {
    let protected = ProtectedResource::new(env.guard.clone(), "projects", "id");
    Router::new()
        .route(
            "/projects/:id",
            get(|Path(id): Path<Uuid>| async move { Json(json!({ "id": id })) }),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            protected,
            tenant_boundary::protect_tenant_resource,
        ))
}

/// Router for POST /projects: membership gate, then body sanitization.
/// The handler echoes the body it received, standing in for the create
/// path.
pub fn create_router(env: &TestEnv) -> Router {
    Router::new()
        .route("/projects", post(|Json(body): Json<Value>| async move { Json(body) }))
        .route_layer(axum_middleware::from_fn_with_state(
            env.guard.clone(),
            tenant_boundary::sanitize_request_body,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            env.guard.clone(),
            tenant_boundary::require_active_membership,
        ))
}

/// Router for POST /projects behind the tenant quota gate.
pub fn quota_router(env: &TestEnv) -> Router {
    let limited = LimitedResource::new(env.guard.clone(), "projects");
    Router::new()
        .route("/projects", post(|| async { Json(json!({ "created": true })) }))
        .route_layer(axum_middleware::from_fn_with_state(
            limited,
            tenant_boundary::enforce_tenant_limits,
        ))
}

pub fn get_as(path: &str, principal: &Principal) -> Request<Body> {
    Request::builder()
        .uri(path)
        .extension(principal.clone())
        .body(Body::empty())
        .unwrap()
}

pub fn post_json_as(path: &str, principal: &Principal, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .extension(principal.clone())
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
