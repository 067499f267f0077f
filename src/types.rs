/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform roles, ordered roughly by privilege.
/// Serialized names are part of the wire/audit contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Superadmin,
    CompanyAdmin,
    Supervisor,
    Operative,
    ReadOnly,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "SUPERADMIN",
            Role::CompanyAdmin => "COMPANY_ADMIN",
            Role::Supervisor => "SUPERVISOR",
            Role::Operative => "OPERATIVE",
            Role::ReadOnly => "READ_ONLY",
        }
    }
}

/// The authenticated actor making a request.
///
/// Produced by the external auth collaborator and injected into the request
/// extensions before any boundary middleware runs. This core never issues or
/// verifies tokens; it trusts the resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub is_superadmin: bool,
}

impl Principal {
    pub fn new(user_id: Uuid, tenant_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            tenant_id,
            role,
            is_superadmin: matches!(role, Role::Superadmin),
        }
    }
}

/// Membership lifecycle within a tenant. Only `Active` grants access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Suspended,
    Pending,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Suspended => "suspended",
            MembershipStatus::Pending => "pending",
        }
    }
}

/// A user's membership row in a tenant, read on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub status: MembershipStatus,
}

/// Company (tenant) lifecycle. Provisioning inserts in `Draft`; activation
/// is a separate guarded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompanyStatus {
    Draft,
    Active,
    Suspended,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::Draft => "DRAFT",
            CompanyStatus::Active => "ACTIVE",
            CompanyStatus::Suspended => "SUSPENDED",
        }
    }
}

/// Subscription plan driving the default feature and limit bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Professional,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "starter",
            Plan::Professional => "professional",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Features enabled for new companies on this plan.
    pub fn default_features(&self) -> &'static [&'static str] {
        match self {
            Plan::Starter => &["projects", "documents"],
            Plan::Professional => &["projects", "documents", "reports", "crew_scheduling"],
            Plan::Enterprise => &[
                "projects",
                "documents",
                "reports",
                "crew_scheduling",
                "api_access",
                "audit_export",
            ],
        }
    }

    /// Per-resource caps for new companies on this plan.
    pub fn default_limits(&self) -> &'static [(&'static str, i64)] {
        match self {
            Plan::Starter => &[("projects", 10), ("members", 5), ("storage_mb", 1024)],
            Plan::Professional => &[("projects", 50), ("members", 25), ("storage_mb", 10240)],
            Plan::Enterprise => &[("projects", 500), ("members", 250), ("storage_mb", 102400)],
        }
    }
}

/// Request metadata captured for audit rows. Either field may be missing
/// (internal callers, background jobs) and is stored as NULL.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_to_wire_names() {
        let json = serde_json::to_string(&Role::CompanyAdmin).unwrap();
        assert_eq!(json, "\"COMPANY_ADMIN\"");
        let back: Role = serde_json::from_str("\"READ_ONLY\"").unwrap();
        assert_eq!(back, Role::ReadOnly);
    }

    #[test]
    fn principal_superadmin_flag_follows_role() {
        let p = Principal::new(Uuid::new_v4(), Uuid::new_v4(), Role::Superadmin);
        assert!(p.is_superadmin);
        let p = Principal::new(Uuid::new_v4(), Uuid::new_v4(), Role::Supervisor);
        assert!(!p.is_superadmin);
    }

    #[test]
    fn plan_defaults_grow_with_tier() {
        assert!(Plan::Starter.default_features().len() < Plan::Enterprise.default_features().len());
        let starter_projects = Plan::Starter
            .default_limits()
            .iter()
            .find(|(r, _)| *r == "projects")
            .unwrap()
            .1;
        assert_eq!(starter_projects, 10);
    }
}
