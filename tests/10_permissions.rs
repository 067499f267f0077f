mod common;

use anyhow::Result;
use uuid::Uuid;

use common::TestEnv;
use sitework_core::audit::actions;
use sitework_core::permissions::{role_permissions, PermissionError};
use sitework_core::types::{Principal, Role};

#[tokio::test]
async fn resolution_order_company_admin_first() -> Result<()> {
    let env = TestEnv::new();
    let tenant = Uuid::new_v4();
    let admin = Principal::new(Uuid::new_v4(), tenant, Role::CompanyAdmin);

    // Own tenant: unconditional for tenant-scoped actions, no grant needed
    assert!(env.engine.can_perform("document:approve", &admin, tenant, false).await?);
    // Foreign tenant: falls through every rule and denies
    assert!(!env.engine.can_perform("document:approve", &admin, Uuid::new_v4(), false).await?);
    Ok(())
}

#[tokio::test]
async fn read_only_role_is_never_grant_gated() -> Result<()> {
    let env = TestEnv::new();
    let tenant = Uuid::new_v4();
    let viewer = Principal::new(Uuid::new_v4(), tenant, Role::ReadOnly);

    // Even with a grant row present, rule 4 only covers supervisor/operative
    env.engine
        .grant_optional_permission(viewer.user_id, tenant, "report:export", Uuid::new_v4(), None, None)
        .await?;
    assert!(!env.engine.can_perform("report:export", &viewer, tenant, false).await?);
    Ok(())
}

#[tokio::test]
async fn break_glass_is_timeboxed_and_revocable() -> Result<()> {
    let env = TestEnv::new();
    let admin = env.superadmin();
    let target = Uuid::new_v4();

    assert!(!env.engine.has_active_break_glass(admin.user_id, target).await?);

    let access = env
        .engine
        .request_break_glass(admin.user_id, target, "support escalation 112", Some(60))
        .await?;
    assert!(env.engine.has_active_break_glass(admin.user_id, target).await?);

    // Audited at warning severity with the justification attached
    let events = env.audit.events_with_action(actions::BREAK_GLASS_REQUESTED).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].details["justification"], "support escalation 112");

    env.engine.revoke_break_glass(access.id).await?;
    assert!(!env.engine.has_active_break_glass(admin.user_id, target).await?);
    Ok(())
}

#[tokio::test]
async fn break_glass_expiry_needs_no_revocation() -> Result<()> {
    let env = TestEnv::new();
    let admin = env.superadmin();
    let target = Uuid::new_v4();

    env.engine
        .request_break_glass(admin.user_id, target, "expires immediately", Some(0))
        .await?;
    assert!(!env.engine.has_active_break_glass(admin.user_id, target).await?);
    Ok(())
}

#[tokio::test]
async fn most_recent_active_grant_governs() -> Result<()> {
    let env = TestEnv::new();
    let admin = env.superadmin();
    let target = Uuid::new_v4();

    // An expired request followed by a fresh one: the fresh one wins
    env.engine
        .request_break_glass(admin.user_id, target, "first, already expired", Some(0))
        .await?;
    env.engine
        .request_break_glass(admin.user_id, target, "second, current", Some(30))
        .await?;
    assert!(env.engine.has_active_break_glass(admin.user_id, target).await?);
    Ok(())
}

#[tokio::test]
async fn revoking_unknown_ids_reports_not_found() -> Result<()> {
    let env = TestEnv::new();

    let err = env.engine.revoke_optional_permission(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PermissionError::NotFound(_)));

    let err = env.engine.revoke_break_glass(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PermissionError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn grant_lifecycle_is_audited() -> Result<()> {
    let env = TestEnv::new();
    let tenant = Uuid::new_v4();
    let grantee = Uuid::new_v4();
    let granted_by = Uuid::new_v4();

    let grant = env
        .engine
        .grant_optional_permission(grantee, tenant, "budget:edit", granted_by, None, None)
        .await?;
    env.engine.revoke_optional_permission(grant.id).await?;

    assert_eq!(env.audit.events_with_action(actions::PERMISSION_GRANTED).await.len(), 1);
    assert_eq!(env.audit.events_with_action(actions::PERMISSION_REVOKED).await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn cleanup_sweep_is_idempotent() -> Result<()> {
    let env = TestEnv::new();
    let admin = env.superadmin();
    let tenant = Uuid::new_v4();

    env.engine
        .request_break_glass(admin.user_id, tenant, "expired on arrival", Some(0))
        .await?;
    env.engine
        .grant_optional_permission(
            Uuid::new_v4(),
            tenant,
            "report:export",
            admin.user_id,
            Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
            None,
        )
        .await?;

    let (deleted, expired) = env.engine.cleanup_expired_permissions().await?;
    assert_eq!((deleted, expired), (1, 1));

    let (deleted, expired) = env.engine.cleanup_expired_permissions().await?;
    assert_eq!((deleted, expired), (0, 0));
    Ok(())
}

#[test]
fn role_table_is_fixed_with_superadmin_wildcard() {
    assert_eq!(role_permissions(Role::Superadmin), &["*"]);
    assert!(role_permissions(Role::CompanyAdmin).contains(&"project:*"));
    assert!(role_permissions(Role::Operative).contains(&"timesheet:submit"));
    assert!(!role_permissions(Role::ReadOnly).contains(&"*"));
}
