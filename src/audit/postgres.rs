use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use super::{AuditEvent, AuditSink, NewAuditEvent};
use crate::database::StoreError;

/// Postgres-backed audit sink appending to `audit_events`.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError> {
        let query = r#"
            INSERT INTO audit_events
                (id, user_id, tenant_id, action, resource, details, severity, ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            RETURNING created_at
        "#;

        let id = Uuid::new_v4();
        let row = sqlx::query(query)
            .bind(id)
            .bind(event.user_id)
            .bind(event.tenant_id)
            .bind(&event.action)
            .bind(&event.resource)
            .bind(&event.details)
            .bind(event.severity.as_str())
            .bind(&event.ip)
            .bind(&event.user_agent)
            .fetch_one(&self.pool)
            .await?;

        Ok(AuditEvent {
            id,
            user_id: event.user_id,
            tenant_id: event.tenant_id,
            action: event.action,
            resource: event.resource,
            details: event.details,
            severity: event.severity,
            ip: event.ip,
            user_agent: event.user_agent,
            created_at: row.get("created_at"),
        })
    }

    async fn count_recent(
        &self,
        user_id: Uuid,
        action: &str,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let query = r#"
            SELECT COUNT(*) AS n
            FROM audit_events
            WHERE user_id = $1
              AND action = $2
              AND created_at >= now() - $3::interval
        "#;

        let interval = format!("{} seconds", window.as_secs());
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(action)
            .bind(interval)
            .fetch_one(&self.pool)
            .await?;

        let n: i64 = row.get("n");
        Ok(n.max(0) as u64)
    }
}
