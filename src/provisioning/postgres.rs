use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{AccountStore, Company, CompanyStore, Invitation, InvitationStore, OwnerRecord,
    PlanBootstrapStore};
use crate::database::StoreError;
use crate::types::{CompanyStatus, Plan};

pub struct PgCompanyStore {
    pool: PgPool,
}

impl PgCompanyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn plan_from_str(s: &str) -> Plan {
    match s {
        "professional" => Plan::Professional,
        "enterprise" => Plan::Enterprise,
        _ => Plan::Starter,
    }
}

fn status_from_str(s: &str) -> CompanyStatus {
    match s {
        "ACTIVE" => CompanyStatus::Active,
        "SUSPENDED" => CompanyStatus::Suspended,
        _ => CompanyStatus::Draft,
    }
}

#[async_trait]
impl CompanyStore for PgCompanyStore {
    async fn insert(&self, company: Company) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO companies (id, name, slug, plan, status, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#;
        sqlx::query(query)
            .bind(company.id)
            .bind(&company.name)
            .bind(&company.slug)
            .bind(company.plan.as_str())
            .bind(company.status.as_str())
            .bind(company.created_by)
            .bind(company.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Company>, StoreError> {
        let query = r#"
            SELECT id, name, slug, plan, status, created_by, created_at
            FROM companies
            WHERE id = $1
        "#;
        let row = sqlx::query(query).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| {
            let plan: String = r.get("plan");
            let status: String = r.get("status");
            Company {
                id: r.get("id"),
                name: r.get("name"),
                slug: r.get("slug"),
                plan: plan_from_str(&plan),
                status: status_from_str(&status),
                created_by: r.get("created_by"),
                created_at: r.get("created_at"),
            }
        }))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM companies WHERE slug = $1) AS present")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("present"))
    }

    async fn set_status(&self, id: Uuid, status: CompanyStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE companies SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1)) AS present",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("present"))
    }

    async fn create_owner(&self, owner: OwnerRecord) -> Result<(), StoreError> {
        // User row and pending membership commit together
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, status)
            VALUES ($1, $2, $3, 'pending')
            "#,
        )
        .bind(owner.user_id)
        .bind(&owner.email)
        .bind(&owner.name)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, tenant_id, role, status)
            VALUES ($1, $2, 'COMPANY_ADMIN', 'pending')
            "#,
        )
        .bind(owner.user_id)
        .bind(owner.company_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_owner(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM memberships WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanBootstrapStore for PgPlanStore {
    async fn enable_features(
        &self,
        company_id: Uuid,
        features: &[&str],
    ) -> Result<(), StoreError> {
        for feature in features {
            sqlx::query(
                r#"
                INSERT INTO company_features (company_id, feature, enabled)
                VALUES ($1, $2, true)
                ON CONFLICT (company_id, feature) DO UPDATE SET enabled = true
                "#,
            )
            .bind(company_id)
            .bind(feature)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn set_limits(
        &self,
        company_id: Uuid,
        limits: &[(&str, i64)],
    ) -> Result<(), StoreError> {
        for (resource_type, max_allowed) in limits {
            sqlx::query(
                r#"
                INSERT INTO tenant_resource_limits (company_id, resource_type, max_allowed)
                VALUES ($1, $2, $3)
                ON CONFLICT (company_id, resource_type) DO UPDATE SET max_allowed = $3
                "#,
            )
            .bind(company_id)
            .bind(resource_type)
            .bind(max_allowed)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

pub struct PgInvitationStore {
    pool: PgPool,
}

impl PgInvitationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvitationStore for PgInvitationStore {
    async fn insert(&self, invitation: Invitation) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO invitations (id, company_id, email, token, expires_at)
            VALUES ($1, $2, $3, $4, $5)
        "#;
        sqlx::query(query)
            .bind(invitation.id)
            .bind(invitation.company_id)
            .bind(&invitation.email)
            .bind(&invitation.token)
            .bind(invitation.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM invitations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
