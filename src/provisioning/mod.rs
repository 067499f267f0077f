// Atomic multi-step tenant provisioning with compensating rollback.
//
// Company creation spans several independently-committing stores, so it is
// a saga rather than a database transaction: each completed step appends a
// rollback handle, and any failure compensates the completed steps in
// reverse order. Compensation errors are logged and never mask the
// original error.

pub mod postgres;
pub mod stores;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{actions, AuditSeverity, AuditSink, NewAuditEvent};
use crate::config;
use crate::database::StoreError;
use crate::types::{CompanyStatus, Plan};

pub use stores::{
    AccountStore, CompanyStore, InvitationStore, LoggingMailSender, MailSender,
    MemoryAccountStore, MemoryCompanyStore, MemoryInvitationStore, MemoryPlanStore,
    PlanBootstrapStore,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub plan: Plan,
    pub status: CompanyStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Owner user row plus its pending membership, created as one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompanyParams {
    pub name: String,
    pub plan: Plan,
}

#[derive(Debug, Clone)]
pub struct OwnerParams {
    pub email: String,
    pub name: String,
}

/// Everything a successful provisioning call hands back.
#[derive(Debug, Clone)]
pub struct ProvisionedCompany {
    pub company: Company,
    pub owner: OwnerRecord,
    pub invitation: Invitation,
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid company name: {0}")]
    InvalidName(String),

    #[error("email already registered: {0}")]
    EmailInUse(String),

    #[error("could not allocate a unique slug for: {0}")]
    SlugExhausted(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("company already active: {0}")]
    AlreadyActive(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rollback handles accumulated during one provisioning call. Consulted
/// only on failure, discarded on success.
enum RollbackStep {
    DeleteCompany(Uuid),
    DeleteOwner(Uuid),
    DeleteInvitation(Uuid),
}

#[derive(Default)]
struct ProvisioningTransaction {
    completed: Vec<RollbackStep>,
}

impl ProvisioningTransaction {
    fn push(&mut self, step: RollbackStep) {
        self.completed.push(step);
    }
}

/// Creates a new tenant (company + owner + invitation + plan defaults) as
/// a single logical transaction.
pub struct ProvisioningOrchestrator {
    companies: Arc<dyn CompanyStore>,
    accounts: Arc<dyn AccountStore>,
    plans: Arc<dyn PlanBootstrapStore>,
    invitations: Arc<dyn InvitationStore>,
    mailer: Arc<dyn MailSender>,
    audit: Arc<dyn AuditSink>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        companies: Arc<dyn CompanyStore>,
        accounts: Arc<dyn AccountStore>,
        plans: Arc<dyn PlanBootstrapStore>,
        invitations: Arc<dyn InvitationStore>,
        mailer: Arc<dyn MailSender>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            companies,
            accounts,
            plans,
            invitations,
            mailer,
            audit,
        }
    }

    /// Provision a company with its owner and invitation.
    ///
    /// Fails before any insert when the owner email is already registered
    /// anywhere in the system. On any later failure the completed steps are
    /// compensated in reverse order and the original error propagates.
    pub async fn create_company(
        &self,
        company: CompanyParams,
        owner: OwnerParams,
        created_by: Uuid,
    ) -> Result<ProvisionedCompany, ProvisioningError> {
        let slug = self.unique_slug(&company.name).await?;

        if self.accounts.email_exists(&owner.email).await? {
            return Err(ProvisioningError::EmailInUse(owner.email));
        }

        let mut tx = ProvisioningTransaction::default();
        match self
            .run_steps(&company, &owner, &slug, created_by, &mut tx)
            .await
        {
            Ok(result) => Ok(result),
            Err(original) => {
                self.rollback(tx).await;
                Err(original)
            }
        }
    }

    async fn run_steps(
        &self,
        params: &CompanyParams,
        owner: &OwnerParams,
        slug: &str,
        created_by: Uuid,
        tx: &mut ProvisioningTransaction,
    ) -> Result<ProvisionedCompany, ProvisioningError> {
        let now = Utc::now();

        // Company lands in DRAFT; activation is a separate transition
        let company = Company {
            id: Uuid::new_v4(),
            name: params.name.clone(),
            slug: slug.to_string(),
            plan: params.plan,
            status: CompanyStatus::Draft,
            created_by,
            created_at: now,
        };
        self.companies.insert(company.clone()).await?;
        tx.push(RollbackStep::DeleteCompany(company.id));

        let owner_record = OwnerRecord {
            user_id: Uuid::new_v4(),
            company_id: company.id,
            email: owner.email.clone(),
            name: owner.name.clone(),
        };
        self.accounts.create_owner(owner_record.clone()).await?;
        tx.push(RollbackStep::DeleteOwner(owner_record.user_id));

        self.plans
            .enable_features(company.id, params.plan.default_features())
            .await?;
        self.plans
            .set_limits(company.id, params.plan.default_limits())
            .await?;

        let invitation = Invitation {
            id: Uuid::new_v4(),
            company_id: company.id,
            email: owner.email.clone(),
            token: invitation_token(),
            expires_at: now
                + chrono::Duration::days(config::config().provisioning.invitation_expiry_days),
        };
        self.invitations.insert(invitation.clone()).await?;
        tx.push(RollbackStep::DeleteInvitation(invitation.id));

        // Best-effort: an unsent email never fails provisioning
        if let Err(e) = self.mailer.send_invitation(&invitation, &company.name).await {
            tracing::warn!(
                "Invitation email for company {} failed, continuing: {}",
                company.id,
                e
            );
        }

        self.audit_quiet(
            NewAuditEvent::new(actions::COMPANY_PROVISIONED, AuditSeverity::Info)
                .user(created_by)
                .tenant(company.id)
                .resource(format!("companies/{}", company.id))
                .details(json!({
                    "slug": company.slug,
                    "plan": company.plan.as_str(),
                    "owner_email": owner_record.email,
                })),
        )
        .await;

        Ok(ProvisionedCompany {
            company,
            owner: owner_record,
            invitation,
        })
    }

    /// Compensate completed steps in reverse order. Failures here are
    /// logged and swallowed so the original saga error reaches the caller.
    async fn rollback(&self, tx: ProvisioningTransaction) {
        for step in tx.completed.into_iter().rev() {
            let outcome = match &step {
                RollbackStep::DeleteInvitation(id) => self.invitations.delete(*id).await,
                RollbackStep::DeleteOwner(id) => self.accounts.delete_owner(*id).await,
                RollbackStep::DeleteCompany(id) => self.companies.delete(*id).await,
            };
            if let Err(e) = outcome {
                let label = match step {
                    RollbackStep::DeleteInvitation(id) => format!("invitation {}", id),
                    RollbackStep::DeleteOwner(id) => format!("owner {}", id),
                    RollbackStep::DeleteCompany(id) => format!("company {}", id),
                };
                tracing::error!("Provisioning rollback failed for {}: {}", label, e);
            }
        }
    }

    /// Idempotency-guarded DRAFT/other -> ACTIVE transition.
    pub async fn activate_company(
        &self,
        company_id: Uuid,
        activated_by: Uuid,
    ) -> Result<Company, ProvisioningError> {
        let mut company = self
            .companies
            .get(company_id)
            .await?
            .ok_or_else(|| ProvisioningError::NotFound(format!("company {}", company_id)))?;

        if company.status == CompanyStatus::Active {
            return Err(ProvisioningError::AlreadyActive(company_id));
        }

        self.companies
            .set_status(company_id, CompanyStatus::Active)
            .await?;
        company.status = CompanyStatus::Active;

        self.audit_quiet(
            NewAuditEvent::new(actions::COMPANY_ACTIVATED, AuditSeverity::Info)
                .user(activated_by)
                .tenant(company_id)
                .resource(format!("companies/{}", company_id)),
        )
        .await;

        Ok(company)
    }

    /// Slugify the company name, retrying with a numeric suffix on
    /// collision.
    async fn unique_slug(&self, name: &str) -> Result<String, ProvisioningError> {
        let base = slugify(name);
        if base.is_empty() {
            return Err(ProvisioningError::InvalidName(
                "Company name must contain letters or digits".to_string(),
            ));
        }

        if !self.companies.slug_exists(&base).await? {
            return Ok(base);
        }
        for n in 2..=config::config().provisioning.slug_max_attempts {
            let candidate = format!("{}-{}", base, n);
            if !self.companies.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(ProvisioningError::SlugExhausted(name.to_string()))
    }

    async fn audit_quiet(&self, event: NewAuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::error!("Failed to record audit event: {}", e);
        }
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed to single
/// hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Url-safe invitation token derived from a fresh UUID.
fn invitation_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_lowercases() {
        assert_eq!(slugify("Apex Builders, Inc."), "apex-builders-inc");
        assert_eq!(slugify("  North & South  "), "north-south");
        assert_eq!(slugify("Éclair"), "clair");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn invitation_tokens_are_unique_and_url_safe() {
        let a = invitation_token();
        let b = invitation_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
