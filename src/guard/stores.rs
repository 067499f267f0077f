use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::StoreError;
use crate::types::{Membership, MembershipStatus};

/// Port over the membership table, read on every request.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Option<Membership>, StoreError>;
}

/// Port that resolves a resource row to its owning tenant.
///
/// `table` must come from a fixed allowlist in implementations that build
/// SQL from it; arbitrary caller strings never reach a query.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    async fn owning_tenant(
        &self,
        table: &str,
        resource_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError>;
}

/// Verdict from the external limits collaborator.
#[derive(Debug, Clone, Copy)]
pub struct LimitDecision {
    pub allowed: bool,
    pub current: i64,
    pub limit: i64,
}

/// Port over the tenant quota collaborator.
#[async_trait]
pub trait TenantLimitChecker: Send + Sync {
    async fn check(&self, tenant_id: Uuid, resource_type: &str) -> Result<LimitDecision, StoreError>;
}

/// In-memory membership store for tests and embedded/dev use.
#[derive(Default)]
pub struct MemoryMembershipStore {
    rows: Arc<RwLock<HashMap<(Uuid, Uuid), Membership>>>,
}

impl MemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, membership: Membership) {
        self.rows
            .write()
            .await
            .insert((membership.user_id, membership.tenant_id), membership);
    }

    pub async fn set_status(&self, user_id: Uuid, tenant_id: Uuid, status: MembershipStatus) {
        if let Some(row) = self.rows.write().await.get_mut(&(user_id, tenant_id)) {
            row.status = status;
        }
    }

    pub async fn remove(&self, user_id: Uuid, tenant_id: Uuid) {
        self.rows.write().await.remove(&(user_id, tenant_id));
    }
}

#[async_trait]
impl MembershipStore for MemoryMembershipStore {
    async fn find(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Option<Membership>, StoreError> {
        Ok(self.rows.read().await.get(&(user_id, tenant_id)).cloned())
    }
}

/// In-memory resource directory: (table, id) -> owning tenant.
#[derive(Default)]
pub struct MemoryResourceDirectory {
    rows: Arc<RwLock<HashMap<(String, Uuid), Uuid>>>,
}

impl MemoryResourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, table: &str, resource_id: Uuid, tenant_id: Uuid) {
        self.rows
            .write()
            .await
            .insert((table.to_string(), resource_id), tenant_id);
    }
}

#[async_trait]
impl ResourceDirectory for MemoryResourceDirectory {
    async fn owning_tenant(
        &self,
        table: &str,
        resource_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&(table.to_string(), resource_id))
            .copied())
    }
}

/// In-memory limit checker with a failure toggle for policy tests.
#[derive(Default)]
pub struct MemoryLimitChecker {
    rows: Arc<RwLock<HashMap<(Uuid, String), (i64, i64)>>>,
    fail: Arc<RwLock<bool>>,
}

impl MemoryLimitChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_usage(&self, tenant_id: Uuid, resource_type: &str, current: i64, limit: i64) {
        self.rows
            .write()
            .await
            .insert((tenant_id, resource_type.to_string()), (current, limit));
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.fail.write().await = failing;
    }
}

#[async_trait]
impl TenantLimitChecker for MemoryLimitChecker {
    async fn check(&self, tenant_id: Uuid, resource_type: &str) -> Result<LimitDecision, StoreError> {
        if *self.fail.read().await {
            return Err(StoreError::Unavailable("limits collaborator offline".to_string()));
        }
        let (current, limit) = self
            .rows
            .read()
            .await
            .get(&(tenant_id, resource_type.to_string()))
            .copied()
            .unwrap_or((0, i64::MAX));
        Ok(LimitDecision {
            allowed: current < limit,
            current,
            limit,
        })
    }
}
