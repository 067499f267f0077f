// Request-level tenant boundary enforcement.
//
// Composes the membership store, resource directory, limits collaborator
// and audit sink into the per-request check chain. Checks are strictly
// sequential and short-circuit on first denial; no check swallows a denial
// to let a later one override it.

pub mod stores;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::audit::{actions, AuditSeverity, AuditSink, NewAuditEvent};
use crate::config;
use crate::error::ApiError;
use crate::types::{MembershipStatus, Principal, RequestMeta};

pub use stores::{
    LimitDecision, MembershipStore, MemoryLimitChecker, MemoryMembershipStore,
    MemoryResourceDirectory, ResourceDirectory, TenantLimitChecker,
};

/// What a check does when its backing store is unreachable.
///
/// This is a named property of each check, not an incidental try/catch
/// difference: authorization and quota checks deny, the enumeration
/// throttle (a defense-in-depth layer, not the primary boundary) allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Open,
    Closed,
}

/// The individual checks the guard exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryCheck {
    Membership,
    ResourceOwnership,
    BodySanitization,
    IdEnumeration,
    TenantLimits,
}

impl BoundaryCheck {
    pub fn failure_policy(self) -> FailurePolicy {
        match self {
            BoundaryCheck::Membership => FailurePolicy::Closed,
            BoundaryCheck::ResourceOwnership => FailurePolicy::Closed,
            BoundaryCheck::BodySanitization => FailurePolicy::Closed,
            BoundaryCheck::IdEnumeration => FailurePolicy::Open,
            BoundaryCheck::TenantLimits => FailurePolicy::Closed,
        }
    }
}

/// Request-level enforcement that no caller reads or mutates another
/// tenant's data, with audited superadmin bypasses.
pub struct TenantBoundaryGuard {
    memberships: Arc<dyn MembershipStore>,
    resources: Arc<dyn ResourceDirectory>,
    limits: Arc<dyn TenantLimitChecker>,
    audit: Arc<dyn AuditSink>,
}

impl TenantBoundaryGuard {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        resources: Arc<dyn ResourceDirectory>,
        limits: Arc<dyn TenantLimitChecker>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            memberships,
            resources,
            limits,
            audit,
        }
    }

    /// Require an active membership row for (user, tenant). Superadmin
    /// bypasses. Any other status, including a missing row, denies 403.
    pub async fn validate_active_membership(
        &self,
        principal: &Principal,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if principal.is_superadmin {
            return Ok(());
        }

        let membership = self
            .memberships
            .find(principal.user_id, principal.tenant_id)
            .await
            .map_err(|e| {
                tracing::error!("Membership lookup failed: {}", e);
                ApiError::internal_server_error("Failed to verify tenant membership")
            })?;

        let status = membership.map(|m| m.status);
        if status != Some(MembershipStatus::Active) {
            tracing::warn!(
                "Membership denied for user {} in tenant {}: status {:?}",
                principal.user_id,
                principal.tenant_id,
                status
            );
            self.audit_quiet(
                NewAuditEvent::new(actions::MEMBERSHIP_DENIED, AuditSeverity::Warning)
                    .user(principal.user_id)
                    .tenant(principal.tenant_id)
                    .details(json!({ "status": status.map(|s| s.as_str()) }))
                    .meta(meta),
            )
            .await;
            return Err(ApiError::forbidden("No active membership in this tenant"));
        }

        Ok(())
    }

    /// Resolve the resource's owning tenant and compare it to the caller's.
    /// Missing resource: 404, info audit (not a security event). Mismatch:
    /// 403, critical audit. Superadmin bypasses, but never silently.
    pub async fn validate_resource_ownership(
        &self,
        principal: &Principal,
        table: &str,
        resource_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if principal.is_superadmin {
            self.audit_quiet(
                NewAuditEvent::new(actions::SUPERADMIN_BYPASS, AuditSeverity::Warning)
                    .user(principal.user_id)
                    .resource(format!("{}/{}", table, resource_id))
                    .details(json!({ "check": "resource_ownership" }))
                    .meta(meta),
            )
            .await;
            return Ok(());
        }

        let owner = self
            .resources
            .owning_tenant(table, resource_id)
            .await
            .map_err(|e| {
                tracing::error!("Ownership lookup failed for {}/{}: {}", table, resource_id, e);
                ApiError::internal_server_error("Failed to verify resource ownership")
            })?;

        match owner {
            None => {
                self.audit_quiet(
                    NewAuditEvent::new(actions::RESOURCE_NOT_FOUND, AuditSeverity::Info)
                        .user(principal.user_id)
                        .tenant(principal.tenant_id)
                        .resource(format!("{}/{}", table, resource_id))
                        .meta(meta),
                )
                .await;
                Err(ApiError::not_found("Resource not found"))
            }
            Some(owner_tenant) if owner_tenant != principal.tenant_id => {
                tracing::warn!(
                    "Cross-tenant access attempt: user {} of tenant {} touched {}/{} owned by {}",
                    principal.user_id,
                    principal.tenant_id,
                    table,
                    resource_id,
                    owner_tenant
                );
                self.audit_quiet(
                    NewAuditEvent::new(actions::CROSS_TENANT_ACCESS_ATTEMPT, AuditSeverity::Critical)
                        .user(principal.user_id)
                        .tenant(principal.tenant_id)
                        .resource(format!("{}/{}", table, resource_id))
                        .details(json!({
                            "caller_tenant": principal.tenant_id,
                            "resource_tenant": owner_tenant,
                        }))
                        .meta(meta),
                )
                .await;
                Err(ApiError::forbidden(
                    "Access denied: Resource belongs to different tenant",
                ))
            }
            Some(_) => Ok(()),
        }
    }

    /// Overwrite a foreign `companyId` in the request body with the
    /// caller's tenant id instead of rejecting the request. Returns whether
    /// a correction happened. Idempotent: a second pass over a corrected
    /// body changes nothing and emits no further audit event.
    pub async fn sanitize_request_body(
        &self,
        principal: &Principal,
        body: &mut serde_json::Value,
        meta: &RequestMeta,
    ) -> Result<bool, ApiError> {
        if principal.is_superadmin {
            return Ok(false);
        }

        let claimed = body
            .get("companyId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        match claimed {
            Some(claimed_tenant) if claimed_tenant != principal.tenant_id => {
                tracing::warn!(
                    "Body injection corrected: user {} sent companyId {} inside tenant {}",
                    principal.user_id,
                    claimed_tenant,
                    principal.tenant_id
                );
                body["companyId"] = json!(principal.tenant_id.to_string());
                self.audit_quiet(
                    NewAuditEvent::new(actions::CROSS_TENANT_BODY_INJECTION, AuditSeverity::Critical)
                        .user(principal.user_id)
                        .tenant(principal.tenant_id)
                        .details(json!({
                            "claimed_tenant": claimed_tenant,
                            "corrected_to": principal.tenant_id,
                        }))
                        .meta(meta),
                )
                .await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Heuristic throttle on id probing. Records one attempt event per
    /// guarded request, counts the trailing window, and denies 429 past the
    /// threshold. Degrades to allow on audit-store failure; this is a
    /// secondary defense whose unavailability must not block legitimate
    /// traffic.
    pub async fn prevent_id_enumeration(
        &self,
        principal: &Principal,
        request_ids: &[Uuid],
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if request_ids.is_empty() {
            return Ok(());
        }

        debug_assert_eq!(
            BoundaryCheck::IdEnumeration.failure_policy(),
            FailurePolicy::Open
        );

        let recorded = self
            .audit
            .record(
                NewAuditEvent::new(actions::ID_ENUMERATION_ATTEMPT, AuditSeverity::Info)
                    .user(principal.user_id)
                    .tenant(principal.tenant_id)
                    .details(json!({ "id_count": request_ids.len() }))
                    .meta(meta),
            )
            .await;
        if let Err(e) = recorded {
            tracing::warn!("Enumeration throttle degraded (record failed): {}", e);
            return Ok(());
        }

        let window = Duration::from_secs(config::config().security.enumeration_window_secs);
        let count = match self
            .audit
            .count_recent(principal.user_id, actions::ID_ENUMERATION_ATTEMPT, window)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Enumeration throttle degraded (count failed): {}", e);
                return Ok(());
            }
        };

        if count > config::config().security.enumeration_threshold {
            self.audit_quiet(
                NewAuditEvent::new(actions::ID_ENUMERATION_ATTEMPT, AuditSeverity::Critical)
                    .user(principal.user_id)
                    .tenant(principal.tenant_id)
                    .details(json!({
                        "window_count": count,
                        "threshold": config::config().security.enumeration_threshold,
                    }))
                    .meta(meta),
            )
            .await;
            return Err(ApiError::too_many_requests("Too many requests"));
        }

        Ok(())
    }

    /// Quota check against the external limits collaborator. Denies 403
    /// with the current/limit figures on an exceeded quota; collaborator
    /// failure denies 500 (quota enforcement errs toward restriction).
    pub async fn validate_tenant_limits(
        &self,
        principal: &Principal,
        resource_type: &str,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        debug_assert_eq!(
            BoundaryCheck::TenantLimits.failure_policy(),
            FailurePolicy::Closed
        );

        let decision = self
            .limits
            .check(principal.tenant_id, resource_type)
            .await
            .map_err(|e| {
                tracing::error!("Limit check failed for tenant {}: {}", principal.tenant_id, e);
                ApiError::internal_server_error("Failed to verify tenant resource limits")
            })?;

        if !decision.allowed {
            self.audit_quiet(
                NewAuditEvent::new(actions::TENANT_LIMIT_DENIED, AuditSeverity::Warning)
                    .user(principal.user_id)
                    .tenant(principal.tenant_id)
                    .details(json!({
                        "resource_type": resource_type,
                        "current": decision.current,
                        "limit": decision.limit,
                    }))
                    .meta(meta),
            )
            .await;
            return Err(ApiError::forbidden(format!(
                "{} limit exceeded ({}/{})",
                resource_type, decision.current, decision.limit
            )));
        }

        Ok(())
    }

    /// Action-level authorization through the permission engine. Engine
    /// errors deny (fail-closed). A superadmin denied on a tenant-scoped
    /// action gets the distinguishable break-glass 403.
    pub async fn authorize_action(
        &self,
        engine: &crate::permissions::PermissionEngine,
        action: &str,
        principal: &Principal,
        resource_tenant_id: Uuid,
        break_glass_requested: bool,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        let allowed = engine
            .can_perform(action, principal, resource_tenant_id, break_glass_requested)
            .await
            .map_err(|e| {
                tracing::error!("Permission check failed for action '{}': {}", action, e);
                ApiError::internal_server_error("Failed to evaluate permissions")
            })?;

        if allowed {
            return Ok(());
        }

        self.audit_quiet(
            NewAuditEvent::new(actions::ACTION_DENIED, AuditSeverity::Warning)
                .user(principal.user_id)
                .tenant(resource_tenant_id)
                .details(json!({
                    "action": action,
                    "role": principal.role.as_str(),
                    "break_glass_requested": break_glass_requested,
                }))
                .meta(meta),
        )
        .await;

        if principal.is_superadmin && !crate::permissions::is_platform_action(action) {
            return Err(ApiError::break_glass_required(
                "Break-glass access required for this tenant",
            ));
        }
        Err(ApiError::forbidden("Insufficient permissions for this action"))
    }

    /// The standard chain for resource routes: membership, then ownership,
    /// then the enumeration throttle. Cheapest and most certain check
    /// first; any failure short-circuits.
    pub async fn protect_tenant_resource(
        &self,
        principal: &Principal,
        table: &str,
        resource_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        self.validate_active_membership(principal, meta).await?;
        self.validate_resource_ownership(principal, table, resource_id, meta)
            .await?;
        self.prevent_id_enumeration(principal, &[resource_id], meta)
            .await?;
        Ok(())
    }

    /// Audit failures never fail the request that produced the event.
    async fn audit_quiet(&self, event: NewAuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::error!("Failed to record audit event: {}", e);
        }
    }
}
