use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BreakGlassAccess, BreakGlassStatus, OptionalPermission};
use crate::database::StoreError;

/// Port over the grant and break-glass tables. All reads are pure; expiry
/// filtering takes an explicit `now` so callers keep lazy-expiry semantics.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn insert_grant(&self, grant: OptionalPermission) -> Result<(), StoreError>;

    /// Hard delete. Returns false when the id does not exist.
    async fn delete_grant(&self, grant_id: Uuid) -> Result<bool, StoreError>;

    /// Existence check: any grant for (user, tenant, permission) with
    /// `expires_at IS NULL OR expires_at > now`.
    async fn has_active_grant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        permission: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn insert_break_glass(&self, access: BreakGlassAccess) -> Result<(), StoreError>;

    /// Most recent grant with persisted status Active for (admin, tenant),
    /// regardless of expiry. The caller evaluates expiry live.
    async fn latest_active_break_glass(
        &self,
        admin_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<BreakGlassAccess>, StoreError>;

    /// Flip a row's status. Returns false when the id does not exist.
    async fn set_break_glass_status(
        &self,
        id: Uuid,
        status: BreakGlassStatus,
    ) -> Result<bool, StoreError>;

    /// Delete grants past expiry. Returns how many rows went away.
    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Flip Active break-glass rows past expiry to Expired.
    async fn expire_break_glass(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory store for tests and embedded/dev use.
#[derive(Default)]
pub struct MemoryPermissionStore {
    grants: Arc<RwLock<Vec<OptionalPermission>>>,
    break_glass: Arc<RwLock<Vec<BreakGlassAccess>>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant_count(&self) -> usize {
        self.grants.read().await.len()
    }

    pub async fn break_glass_rows(&self) -> Vec<BreakGlassAccess> {
        self.break_glass.read().await.clone()
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn insert_grant(&self, grant: OptionalPermission) -> Result<(), StoreError> {
        self.grants.write().await.push(grant);
        Ok(())
    }

    async fn delete_grant(&self, grant_id: Uuid) -> Result<bool, StoreError> {
        let mut grants = self.grants.write().await;
        let before = grants.len();
        grants.retain(|g| g.id != grant_id);
        Ok(grants.len() < before)
    }

    async fn has_active_grant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        permission: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.grants.read().await.iter().any(|g| {
            g.user_id == user_id
                && g.tenant_id == tenant_id
                && g.permission == permission
                && g.expires_at.map(|e| e > now).unwrap_or(true)
        }))
    }

    async fn insert_break_glass(&self, access: BreakGlassAccess) -> Result<(), StoreError> {
        self.break_glass.write().await.push(access);
        Ok(())
    }

    async fn latest_active_break_glass(
        &self,
        admin_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<BreakGlassAccess>, StoreError> {
        Ok(self
            .break_glass
            .read()
            .await
            .iter()
            .filter(|b| {
                b.admin_id == admin_id
                    && b.target_company_id == tenant_id
                    && b.status == BreakGlassStatus::Active
            })
            .max_by_key(|b| b.granted_at)
            .cloned())
    }

    async fn set_break_glass_status(
        &self,
        id: Uuid,
        status: BreakGlassStatus,
    ) -> Result<bool, StoreError> {
        let mut rows = self.break_glass.write().await;
        match rows.iter_mut().find(|b| b.id == id) {
            Some(row) => {
                row.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut grants = self.grants.write().await;
        let before = grants.len();
        grants.retain(|g| g.expires_at.map(|e| e > now).unwrap_or(true));
        Ok((before - grants.len()) as u64)
    }

    async fn expire_break_glass(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.break_glass.write().await;
        let mut flipped = 0;
        for row in rows.iter_mut() {
            if row.status == BreakGlassStatus::Active && row.expires_at <= now {
                row.status = BreakGlassStatus::Expired;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}
