// Append-only recorder of security-relevant events.
//
// Every boundary decision writes here. External tooling (compliance export,
// SIEM forwarding) matches on the persisted field names and severities, so
// both are part of the durable contract and must not be renamed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::database::StoreError;

/// Stable action names recorded on audit rows.
pub mod actions {
    pub const CROSS_TENANT_ACCESS_ATTEMPT: &str = "CROSS_TENANT_ACCESS_ATTEMPT";
    pub const CROSS_TENANT_BODY_INJECTION: &str = "CROSS_TENANT_BODY_INJECTION";
    pub const ID_ENUMERATION_ATTEMPT: &str = "ID_ENUMERATION_ATTEMPT";
    pub const SUPERADMIN_BYPASS: &str = "SUPERADMIN_BYPASS";
    pub const MEMBERSHIP_DENIED: &str = "MEMBERSHIP_DENIED";
    pub const ACTION_DENIED: &str = "ACTION_DENIED";
    pub const RESOURCE_NOT_FOUND: &str = "RESOURCE_NOT_FOUND";
    pub const TENANT_LIMIT_DENIED: &str = "TENANT_LIMIT_DENIED";
    pub const PERMISSION_GRANTED: &str = "PERMISSION_GRANTED";
    pub const PERMISSION_REVOKED: &str = "PERMISSION_REVOKED";
    pub const BREAK_GLASS_REQUESTED: &str = "BREAK_GLASS_REQUESTED";
    pub const BREAK_GLASS_REVOKED: &str = "BREAK_GLASS_REVOKED";
    pub const COMPANY_PROVISIONED: &str = "COMPANY_PROVISIONED";
    pub const COMPANY_ACTIVATED: &str = "COMPANY_ACTIVATED";
}

/// Severity levels persisted verbatim as lowercase strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Critical => "critical",
        }
    }
}

/// Event payload as produced at a decision point. The sink assigns the id
/// and timestamp at append time.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub details: Value,
    pub severity: AuditSeverity,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditEvent {
    pub fn new(action: &str, severity: AuditSeverity) -> Self {
        Self {
            user_id: None,
            tenant_id: None,
            action: action.to_string(),
            resource: String::new(),
            details: Value::Null,
            severity,
            ip: None,
            user_agent: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn meta(mut self, meta: &crate::types::RequestMeta) -> Self {
        self.ip = meta.ip.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }
}

/// Persisted audit row. Append-only; never mutated or deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub details: Value,
    pub severity: AuditSeverity,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Port for the durable audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one event. The caller decides whether a failure here may
    /// fail the surrounding request; most call sites log and continue.
    async fn record(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError>;

    /// Counts events for a user with the given action inside the trailing
    /// window. Used by the enumeration throttle.
    async fn count_recent(
        &self,
        user_id: Uuid,
        action: &str,
        window: Duration,
    ) -> Result<u64, StoreError>;
}
