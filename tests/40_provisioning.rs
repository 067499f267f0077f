mod common;

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use sitework_core::audit::{actions, memory::MemoryAuditSink};
use sitework_core::provisioning::{
    CompanyParams, LoggingMailSender, MemoryAccountStore, MemoryCompanyStore,
    MemoryInvitationStore, MemoryPlanStore, OwnerParams, ProvisioningError,
    ProvisioningOrchestrator,
};
use sitework_core::types::{CompanyStatus, Plan};

struct Harness {
    companies: Arc<MemoryCompanyStore>,
    accounts: Arc<MemoryAccountStore>,
    plans: Arc<MemoryPlanStore>,
    invitations: Arc<MemoryInvitationStore>,
    mailer: Arc<LoggingMailSender>,
    audit: Arc<MemoryAuditSink>,
    orchestrator: ProvisioningOrchestrator,
}

impl Harness {
    fn new() -> Self {
        let companies = Arc::new(MemoryCompanyStore::new());
        let accounts = Arc::new(MemoryAccountStore::new());
        let plans = Arc::new(MemoryPlanStore::new());
        let invitations = Arc::new(MemoryInvitationStore::new());
        let mailer = Arc::new(LoggingMailSender::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = ProvisioningOrchestrator::new(
            companies.clone(),
            accounts.clone(),
            plans.clone(),
            invitations.clone(),
            mailer.clone(),
            audit.clone(),
        );
        Self {
            companies,
            accounts,
            plans,
            invitations,
            mailer,
            audit,
            orchestrator,
        }
    }

    fn params(name: &str, email: &str) -> (CompanyParams, OwnerParams) {
        (
            CompanyParams { name: name.to_string(), plan: Plan::Professional },
            OwnerParams { email: email.to_string(), name: "Dana Mota".to_string() },
        )
    }
}

#[tokio::test]
async fn provisions_company_owner_and_invitation() -> Result<()> {
    let h = Harness::new();
    let (company, owner) = Harness::params("Apex Builders, Inc.", "dana@apexbuilders.test");

    let provisioned = h.orchestrator.create_company(company, owner, Uuid::new_v4()).await?;

    assert_eq!(provisioned.company.slug, "apex-builders-inc");
    assert_eq!(provisioned.company.status, CompanyStatus::Draft);
    assert_eq!(provisioned.owner.company_id, provisioned.company.id);
    assert_eq!(provisioned.invitation.email, "dana@apexbuilders.test");
    assert_eq!(provisioned.invitation.company_id, provisioned.company.id);

    assert_eq!(h.companies.count().await, 1);
    assert_eq!(h.accounts.count().await, 1);
    assert_eq!(h.invitations.count().await, 1);
    // Plan defaults were bootstrapped
    let features = h.plans.features_for(provisioned.company.id).await;
    assert!(features.contains(&"crew_scheduling".to_string()));

    assert_eq!(h.audit.events_with_action(actions::COMPANY_PROVISIONED).await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn mid_saga_failure_rolls_back_everything() -> Result<()> {
    let h = Harness::new();
    let (company, owner) = Harness::params("Granite Civil", "ops@granitecivil.test");

    // Feature bootstrap (step 5) blows up after company and owner landed
    h.plans.fail_features(true).await;
    let err = h
        .orchestrator
        .create_company(company, owner, Uuid::new_v4())
        .await
        .unwrap_err();

    // The original error reaches the caller, not a rollback error
    assert!(matches!(err, ProvisioningError::Store(_)));

    // Full rollback: no company, user, membership or invitation remains
    assert_eq!(h.companies.count().await, 0);
    assert_eq!(h.accounts.count().await, 0);
    assert_eq!(h.invitations.count().await, 0);
    Ok(())
}

#[tokio::test]
async fn limit_bootstrap_failure_also_rolls_back() -> Result<()> {
    let h = Harness::new();
    let (company, owner) = Harness::params("Granite Civil", "ops@granitecivil.test");

    h.plans.fail_limits(true).await;
    h.orchestrator
        .create_company(company, owner, Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(h.companies.count().await, 0);
    assert_eq!(h.accounts.count().await, 0);
    Ok(())
}

#[tokio::test]
async fn existing_owner_email_fails_before_any_insert() -> Result<()> {
    let h = Harness::new();
    h.accounts.seed_email("taken@example.test").await;
    let (company, owner) = Harness::params("Redline Interiors", "taken@example.test");

    let err = h
        .orchestrator
        .create_company(company, owner, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::EmailInUse(_)));

    // Nothing was inserted for the failed attempt
    assert_eq!(h.companies.count().await, 0);
    assert_eq!(h.invitations.count().await, 0);
    Ok(())
}

#[tokio::test]
async fn email_send_failure_does_not_fail_provisioning() -> Result<()> {
    let h = Harness::new();
    h.mailer.set_failing(true).await;
    let (company, owner) = Harness::params("Harbor Marine Works", "pm@harbormarine.test");

    let provisioned = h.orchestrator.create_company(company, owner, Uuid::new_v4()).await?;
    assert_eq!(h.invitations.count().await, 1);
    assert_eq!(provisioned.company.status, CompanyStatus::Draft);
    Ok(())
}

#[tokio::test]
async fn slug_collisions_retry_with_numeric_suffix() -> Result<()> {
    let h = Harness::new();
    h.companies.claim_slug("apex-builders").await;
    h.companies.claim_slug("apex-builders-2").await;
    let (company, owner) = Harness::params("Apex Builders", "new@apex.test");

    let provisioned = h.orchestrator.create_company(company, owner, Uuid::new_v4()).await?;
    assert_eq!(provisioned.company.slug, "apex-builders-3");
    Ok(())
}

#[tokio::test]
async fn unusable_company_name_is_rejected() -> Result<()> {
    let h = Harness::new();
    let (company, owner) = Harness::params("!!!", "x@y.test");

    let err = h
        .orchestrator
        .create_company(company, owner, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::InvalidName(_)));
    Ok(())
}

#[tokio::test]
async fn activation_is_idempotency_guarded() -> Result<()> {
    let h = Harness::new();
    let (company, owner) = Harness::params("Summit Roofing", "amr@summitroofing.test");
    let provisioned = h.orchestrator.create_company(company, owner, Uuid::new_v4()).await?;

    let activated = h
        .orchestrator
        .activate_company(provisioned.company.id, Uuid::new_v4())
        .await?;
    assert_eq!(activated.status, CompanyStatus::Active);
    assert_eq!(h.audit.events_with_action(actions::COMPANY_ACTIVATED).await.len(), 1);

    // Second activation rejects instead of silently succeeding
    let err = h
        .orchestrator
        .activate_company(provisioned.company.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::AlreadyActive(_)));

    let err = h
        .orchestrator
        .activate_company(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::NotFound(_)));
    Ok(())
}
