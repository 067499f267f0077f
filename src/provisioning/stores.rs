use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Company, Invitation, OwnerRecord};
use crate::database::StoreError;
use crate::types::CompanyStatus;

/// Port over the company registry.
#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn insert(&self, company: Company) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Company>, StoreError>;
    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError>;
    async fn set_status(&self, id: Uuid, status: CompanyStatus) -> Result<bool, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Port over user accounts and their memberships. Owner creation writes
/// the user row and the pending membership together.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;
    async fn create_owner(&self, owner: OwnerRecord) -> Result<(), StoreError>;
    /// Removes the user row and its membership.
    async fn delete_owner(&self, user_id: Uuid) -> Result<(), StoreError>;
}

/// Port bootstrapping plan defaults for a fresh company.
#[async_trait]
pub trait PlanBootstrapStore: Send + Sync {
    async fn enable_features(
        &self,
        company_id: Uuid,
        features: &[&str],
    ) -> Result<(), StoreError>;
    async fn set_limits(
        &self,
        company_id: Uuid,
        limits: &[(&str, i64)],
    ) -> Result<(), StoreError>;
}

/// Port over owner invitations.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert(&self, invitation: Invitation) -> Result<(), StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Outbound mail seam. Sends are best-effort; provisioning never fails on
/// a mail error.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_invitation(&self, invitation: &Invitation, company_name: &str)
        -> Result<(), StoreError>;
}

/// In-memory company registry.
#[derive(Default)]
pub struct MemoryCompanyStore {
    rows: Arc<RwLock<HashMap<Uuid, Company>>>,
    taken_slugs: Arc<RwLock<Vec<String>>>,
}

impl MemoryCompanyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-claim a slug without a row, to force collision handling.
    pub async fn claim_slug(&self, slug: &str) {
        self.taken_slugs.write().await.push(slug.to_string());
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl CompanyStore for MemoryCompanyStore {
    async fn insert(&self, company: Company) -> Result<(), StoreError> {
        self.rows.write().await.insert(company.id, company);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Company>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        if self.taken_slugs.read().await.iter().any(|s| s == slug) {
            return Ok(true);
        }
        Ok(self.rows.read().await.values().any(|c| c.slug == slug))
    }

    async fn set_status(&self, id: Uuid, status: CompanyStatus) -> Result<bool, StoreError> {
        match self.rows.write().await.get_mut(&id) {
            Some(row) => {
                row.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.rows.write().await.remove(&id);
        Ok(())
    }
}

/// In-memory accounts plus memberships.
#[derive(Default)]
pub struct MemoryAccountStore {
    rows: Arc<RwLock<HashMap<Uuid, OwnerRecord>>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_email(&self, email: &str) {
        let record = OwnerRecord {
            user_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            email: email.to_string(),
            name: "existing user".to_string(),
        };
        self.rows.write().await.insert(record.user_id, record);
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .any(|r| r.email.eq_ignore_ascii_case(email)))
    }

    async fn create_owner(&self, owner: OwnerRecord) -> Result<(), StoreError> {
        self.rows.write().await.insert(owner.user_id, owner);
        Ok(())
    }

    async fn delete_owner(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.rows.write().await.remove(&user_id);
        Ok(())
    }
}

/// In-memory plan bootstrap with per-step failure toggles for saga tests.
#[derive(Default)]
pub struct MemoryPlanStore {
    features: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
    limits: Arc<RwLock<HashMap<Uuid, Vec<(String, i64)>>>>,
    fail_features: Arc<RwLock<bool>>,
    fail_limits: Arc<RwLock<bool>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_features(&self, fail: bool) {
        *self.fail_features.write().await = fail;
    }

    pub async fn fail_limits(&self, fail: bool) {
        *self.fail_limits.write().await = fail;
    }

    pub async fn features_for(&self, company_id: Uuid) -> Vec<String> {
        self.features
            .read()
            .await
            .get(&company_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlanBootstrapStore for MemoryPlanStore {
    async fn enable_features(
        &self,
        company_id: Uuid,
        features: &[&str],
    ) -> Result<(), StoreError> {
        if *self.fail_features.read().await {
            return Err(StoreError::Unavailable("feature store offline".to_string()));
        }
        self.features
            .write()
            .await
            .insert(company_id, features.iter().map(|s| s.to_string()).collect());
        Ok(())
    }

    async fn set_limits(
        &self,
        company_id: Uuid,
        limits: &[(&str, i64)],
    ) -> Result<(), StoreError> {
        if *self.fail_limits.read().await {
            return Err(StoreError::Unavailable("limit store offline".to_string()));
        }
        self.limits.write().await.insert(
            company_id,
            limits.iter().map(|(r, n)| (r.to_string(), *n)).collect(),
        );
        Ok(())
    }
}

/// In-memory invitations.
#[derive(Default)]
pub struct MemoryInvitationStore {
    rows: Arc<RwLock<HashMap<Uuid, Invitation>>>,
}

impl MemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl InvitationStore for MemoryInvitationStore {
    async fn insert(&self, invitation: Invitation) -> Result<(), StoreError> {
        self.rows.write().await.insert(invitation.id, invitation);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.rows.write().await.remove(&id);
        Ok(())
    }
}

/// Mail sender that only logs. The notification service owns real email.
#[derive(Default)]
pub struct LoggingMailSender {
    fail: Arc<RwLock<bool>>,
}

impl LoggingMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.fail.write().await = failing;
    }
}

#[async_trait]
impl MailSender for LoggingMailSender {
    async fn send_invitation(
        &self,
        invitation: &Invitation,
        company_name: &str,
    ) -> Result<(), StoreError> {
        if *self.fail.read().await {
            return Err(StoreError::Unavailable("smtp relay offline".to_string()));
        }
        tracing::info!(
            "Invitation {} queued for {} ({})",
            invitation.id,
            invitation.email,
            company_name
        );
        Ok(())
    }
}
