// Postgres implementations of the boundary-check ports.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::StoreError;
use crate::guard::{LimitDecision, MembershipStore, ResourceDirectory, TenantLimitChecker};
use crate::types::{Membership, MembershipStatus, Role};

/// Tables the ownership check may be pointed at. SQL is built from this
/// list only; caller strings never reach a query as identifiers.
const OWNED_TABLES: &[&str] = &[
    "projects",
    "documents",
    "crews",
    "reports",
    "invoices",
    "site_diaries",
];

fn role_from_str(s: &str) -> Role {
    match s {
        "SUPERADMIN" => Role::Superadmin,
        "COMPANY_ADMIN" => Role::CompanyAdmin,
        "SUPERVISOR" => Role::Supervisor,
        "OPERATIVE" => Role::Operative,
        _ => Role::ReadOnly,
    }
}

fn membership_status_from_str(s: &str) -> MembershipStatus {
    match s {
        "active" => MembershipStatus::Active,
        "suspended" => MembershipStatus::Suspended,
        _ => MembershipStatus::Pending,
    }
}

pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn find(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Option<Membership>, StoreError> {
        let query = r#"
            SELECT user_id, tenant_id, role, status
            FROM memberships
            WHERE user_id = $1 AND tenant_id = $2
        "#;
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let role: String = r.get("role");
            let status: String = r.get("status");
            Membership {
                user_id: r.get("user_id"),
                tenant_id: r.get("tenant_id"),
                role: role_from_str(&role),
                status: membership_status_from_str(&status),
            }
        }))
    }
}

pub struct PgResourceDirectory {
    pool: PgPool,
}

impl PgResourceDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceDirectory for PgResourceDirectory {
    async fn owning_tenant(
        &self,
        table: &str,
        resource_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        if !OWNED_TABLES.contains(&table) {
            return Err(StoreError::Unavailable(format!(
                "table '{}' is not registered for ownership checks",
                table
            )));
        }

        // Identifier comes from the allowlist above, never from the caller
        let query = format!("SELECT company_id FROM {} WHERE id = $1", table);
        let row = sqlx::query(&query)
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("company_id")))
    }
}

pub struct PgTenantLimitChecker {
    pool: PgPool,
}

impl PgTenantLimitChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantLimitChecker for PgTenantLimitChecker {
    async fn check(&self, tenant_id: Uuid, resource_type: &str) -> Result<LimitDecision, StoreError> {
        let query = r#"
            SELECT current_count, max_allowed
            FROM tenant_resource_limits
            WHERE company_id = $1 AND resource_type = $2
        "#;
        let row = sqlx::query(query)
            .bind(tenant_id)
            .bind(resource_type)
            .fetch_optional(&self.pool)
            .await?;

        // A tenant with no limit row is unconstrained for that resource
        Ok(match row {
            Some(r) => {
                let current: i64 = r.get("current_count");
                let limit: i64 = r.get("max_allowed");
                LimitDecision {
                    allowed: current < limit,
                    current,
                    limit,
                }
            }
            None => LimitDecision {
                allowed: true,
                current: 0,
                limit: i64::MAX,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tables_are_rejected_before_sql() {
        assert!(!OWNED_TABLES.contains(&"users; DROP TABLE users"));
        assert!(OWNED_TABLES.contains(&"projects"));
    }

    #[test]
    fn enum_parsers_fall_back_safely() {
        assert_eq!(role_from_str("COMPANY_ADMIN"), Role::CompanyAdmin);
        assert_eq!(role_from_str("garbage"), Role::ReadOnly);
        assert_eq!(membership_status_from_str("active"), MembershipStatus::Active);
        assert_eq!(membership_status_from_str("garbage"), MembershipStatus::Pending);
    }
}
