use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    is_optional_gated, is_platform_action, BreakGlassAccess, BreakGlassStatus, OptionalPermission,
    PermissionError, PermissionStore,
};
use crate::audit::{actions, AuditSeverity, AuditSink, NewAuditEvent};
use crate::config;
use crate::types::{Principal, Role};

/// Evaluates whether a principal may perform an action, and owns the
/// optional-permission and break-glass lifecycles.
///
/// All lookups are pure reads. Store failures propagate to the caller as
/// errors; the boundary guard treats those as deny (fail-closed).
pub struct PermissionEngine {
    store: Arc<dyn PermissionStore>,
    audit: Arc<dyn AuditSink>,
}

impl PermissionEngine {
    pub fn new(store: Arc<dyn PermissionStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Resolution order, first match wins:
    ///
    /// 1. Company admin inside their own tenant: allowed for any
    ///    tenant-scoped action.
    /// 2. Superadmin performing a platform-only action: allowed.
    /// 3. Superadmin with `break_glass_requested`: allowed iff an active,
    ///    unexpired break-glass grant exists for (admin, tenant).
    /// 4. Supervisor/operative on an optional-gated action: allowed iff an
    ///    unexpired grant row exists.
    /// 5. Deny.
    pub async fn can_perform(
        &self,
        action: &str,
        principal: &Principal,
        resource_tenant_id: Uuid,
        break_glass_requested: bool,
    ) -> Result<bool, PermissionError> {
        if principal.role == Role::CompanyAdmin
            && principal.tenant_id == resource_tenant_id
            && !is_platform_action(action)
        {
            return Ok(true);
        }

        if principal.role == Role::Superadmin && is_platform_action(action) {
            return Ok(true);
        }

        if principal.role == Role::Superadmin && break_glass_requested {
            return Ok(self
                .has_active_break_glass(principal.user_id, resource_tenant_id)
                .await?);
        }

        if matches!(principal.role, Role::Supervisor | Role::Operative)
            && is_optional_gated(action)
        {
            return Ok(self
                .store
                .has_active_grant(principal.user_id, resource_tenant_id, action, Utc::now())
                .await?);
        }

        Ok(false)
    }

    /// Insert a new grant row. No uniqueness validation: duplicates per
    /// (user, tenant, permission) are tolerated because checks are
    /// existence-based. The grantor is not permission-checked here; callers
    /// gate who may call this.
    pub async fn grant_optional_permission(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        permission: &str,
        granted_by: Uuid,
        expires_at: Option<chrono::DateTime<Utc>>,
        constraints: Option<serde_json::Value>,
    ) -> Result<OptionalPermission, PermissionError> {
        let grant = OptionalPermission {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            permission: permission.to_string(),
            granted_by,
            granted_at: Utc::now(),
            expires_at,
            constraints,
        };
        self.store.insert_grant(grant.clone()).await?;

        self.audit_quiet(
            NewAuditEvent::new(actions::PERMISSION_GRANTED, AuditSeverity::Info)
                .user(granted_by)
                .tenant(tenant_id)
                .resource(format!("optional_permissions/{}", grant.id))
                .details(json!({
                    "grantee": user_id,
                    "permission": permission,
                    "expires_at": grant.expires_at,
                })),
        )
        .await;

        Ok(grant)
    }

    /// Hard-delete a grant. `NotFound` when the id does not exist.
    pub async fn revoke_optional_permission(&self, grant_id: Uuid) -> Result<(), PermissionError> {
        if !self.store.delete_grant(grant_id).await? {
            return Err(PermissionError::NotFound(format!(
                "optional permission {}",
                grant_id
            )));
        }
        self.audit_quiet(
            NewAuditEvent::new(actions::PERMISSION_REVOKED, AuditSeverity::Info)
                .resource(format!("optional_permissions/{}", grant_id)),
        )
        .await;
        Ok(())
    }

    /// Create a time-boxed break-glass grant for a platform operator.
    ///
    /// CAUTION: this method does NOT verify that `admin_id` belongs to a
    /// superadmin. The route layer owns that gate; calling the engine
    /// directly from anywhere else bypasses it. Kept this way deliberately
    /// to separate "record a grant" from "may this role request one".
    pub async fn request_break_glass(
        &self,
        admin_id: Uuid,
        target_company_id: Uuid,
        justification: &str,
        duration_minutes: Option<i64>,
    ) -> Result<BreakGlassAccess, PermissionError> {
        if justification.trim().is_empty() {
            return Err(PermissionError::Validation(
                "Break-glass access requires a justification".to_string(),
            ));
        }

        let duration = duration_minutes
            .unwrap_or(config::config().security.break_glass_duration_minutes);
        let now = Utc::now();
        let access = BreakGlassAccess {
            id: Uuid::new_v4(),
            admin_id,
            target_company_id,
            justification: justification.trim().to_string(),
            granted_at: now,
            expires_at: now + chrono::Duration::minutes(duration),
            status: BreakGlassStatus::Active,
        };
        self.store.insert_break_glass(access.clone()).await?;

        tracing::warn!(
            "Break-glass access granted: admin {} into company {} for {} minutes",
            admin_id,
            target_company_id,
            duration
        );
        self.audit_quiet(
            NewAuditEvent::new(actions::BREAK_GLASS_REQUESTED, AuditSeverity::Warning)
                .user(admin_id)
                .tenant(target_company_id)
                .resource(format!("break_glass/{}", access.id))
                .details(json!({
                    "justification": access.justification,
                    "expires_at": access.expires_at,
                })),
        )
        .await;

        Ok(access)
    }

    /// Explicit Active -> Revoked transition.
    pub async fn revoke_break_glass(&self, id: Uuid) -> Result<(), PermissionError> {
        if !self
            .store
            .set_break_glass_status(id, BreakGlassStatus::Revoked)
            .await?
        {
            return Err(PermissionError::NotFound(format!("break-glass access {}", id)));
        }
        self.audit_quiet(
            NewAuditEvent::new(actions::BREAK_GLASS_REVOKED, AuditSeverity::Warning)
                .resource(format!("break_glass/{}", id)),
        )
        .await;
        Ok(())
    }

    /// True iff a persisted-Active, unexpired grant exists. Expiry is
    /// evaluated here, not written back; the cleanup sweep owns the status
    /// flip.
    pub async fn has_active_break_glass(
        &self,
        admin_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<bool, PermissionError> {
        let latest = self.store.latest_active_break_glass(admin_id, tenant_id).await?;
        Ok(latest.map(|g| g.is_effective(Utc::now())).unwrap_or(false))
    }

    /// Idempotent sweep: deletes expired grants, flips expired Active
    /// break-glass rows to Expired. Safe on any cadence.
    pub async fn cleanup_expired_permissions(&self) -> Result<(u64, u64), PermissionError> {
        let now = Utc::now();
        let deleted = self.store.delete_expired_grants(now).await?;
        let expired = self.store.expire_break_glass(now).await?;
        if deleted > 0 || expired > 0 {
            tracing::debug!(
                "Permission cleanup: {} grants deleted, {} break-glass rows expired",
                deleted,
                expired
            );
        }
        Ok((deleted, expired))
    }

    /// Audit failures never fail the operation that produced the event.
    async fn audit_quiet(&self, event: NewAuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::error!("Failed to record audit event: {}", e);
        }
    }
}

/// Spawn the periodic expired-permission cleanup task.
pub fn spawn_cleanup(engine: Arc<PermissionEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = engine.cleanup_expired_permissions().await {
                tracing::error!("Permission cleanup pass failed: {}", e);
            }
        }
    })
}
