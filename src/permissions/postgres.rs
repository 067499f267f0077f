use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{BreakGlassAccess, BreakGlassStatus, OptionalPermission, PermissionStore};
use crate::database::StoreError;

/// Postgres store over `optional_permissions` and `break_glass_access`.
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn break_glass_from_row(row: &sqlx::postgres::PgRow) -> BreakGlassAccess {
    let status: String = row.get("status");
    BreakGlassAccess {
        id: row.get("id"),
        admin_id: row.get("admin_id"),
        target_company_id: row.get("target_company_id"),
        justification: row.get("justification"),
        granted_at: row.get("granted_at"),
        expires_at: row.get("expires_at"),
        status: match status.as_str() {
            "revoked" => BreakGlassStatus::Revoked,
            "expired" => BreakGlassStatus::Expired,
            _ => BreakGlassStatus::Active,
        },
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn insert_grant(&self, grant: OptionalPermission) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO optional_permissions
                (id, user_id, tenant_id, permission, granted_by, granted_at, expires_at, constraints)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#;
        sqlx::query(query)
            .bind(grant.id)
            .bind(grant.user_id)
            .bind(grant.tenant_id)
            .bind(&grant.permission)
            .bind(grant.granted_by)
            .bind(grant.granted_at)
            .bind(grant.expires_at)
            .bind(&grant.constraints)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_grant(&self, grant_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM optional_permissions WHERE id = $1")
            .bind(grant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn has_active_grant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        permission: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r#"
            SELECT EXISTS (
                SELECT 1 FROM optional_permissions
                WHERE user_id = $1
                  AND tenant_id = $2
                  AND permission = $3
                  AND (expires_at IS NULL OR expires_at > $4)
            ) AS present
        "#;
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(tenant_id)
            .bind(permission)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("present"))
    }

    async fn insert_break_glass(&self, access: BreakGlassAccess) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO break_glass_access
                (id, admin_id, target_company_id, justification, granted_at, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#;
        sqlx::query(query)
            .bind(access.id)
            .bind(access.admin_id)
            .bind(access.target_company_id)
            .bind(&access.justification)
            .bind(access.granted_at)
            .bind(access.expires_at)
            .bind(access.status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_active_break_glass(
        &self,
        admin_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<BreakGlassAccess>, StoreError> {
        let query = r#"
            SELECT id, admin_id, target_company_id, justification, granted_at, expires_at, status
            FROM break_glass_access
            WHERE admin_id = $1
              AND target_company_id = $2
              AND status = 'active'
            ORDER BY granted_at DESC
            LIMIT 1
        "#;
        let row = sqlx::query(query)
            .bind(admin_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(break_glass_from_row))
    }

    async fn set_break_glass_status(
        &self,
        id: Uuid,
        status: BreakGlassStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE break_glass_access SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM optional_permissions WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn expire_break_glass(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE break_glass_access SET status = 'expired' WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
