// Permission evaluation: roles, optional grants, break-glass access.

pub mod engine;
pub mod postgres;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::database::StoreError;
use crate::types::Role;

pub use engine::PermissionEngine;
pub use store::{MemoryPermissionStore, PermissionStore};

/// Platform-only actions a superadmin may perform without entering any
/// tenant. Everything else is tenant-scoped.
pub const PLATFORM_ACTIONS: &[&str] = &[
    "company:create",
    "platform:provision",
    "platform:broadcast",
    "platform:logs",
];

/// Actions gated behind an optional permission grant rather than the static
/// role table. Grants themselves are string-keyed, so this list can grow
/// without a schema change.
pub const OPTIONAL_GATED_ACTIONS: &[&str] = &[
    "project:delete",
    "document:approve",
    "budget:edit",
    "report:export",
];

pub fn is_platform_action(action: &str) -> bool {
    PLATFORM_ACTIONS.contains(&action)
}

pub fn is_optional_gated(action: &str) -> bool {
    OPTIONAL_GATED_ACTIONS.contains(&action)
}

/// Static role-to-permission table. Fixed, not data-driven; the superadmin
/// wildcard means "everything, subject to the break-glass rules".
pub fn role_permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::Superadmin => &["*"],
        Role::CompanyAdmin => &[
            "project:*",
            "document:*",
            "crew:*",
            "report:*",
            "member:*",
            "settings:*",
        ],
        Role::Supervisor => &[
            "project:read",
            "project:update",
            "document:read",
            "document:upload",
            "crew:read",
            "crew:assign",
            "report:read",
        ],
        Role::Operative => &["project:read", "document:read", "timesheet:submit"],
        Role::ReadOnly => &["project:read", "document:read", "report:read"],
    }
}

/// A scoped, possibly time-limited capability grant beyond the role's
/// defaults. Duplicates per (user, tenant, permission) are tolerated;
/// checks are existence-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionalPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub permission: String,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub constraints: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakGlassStatus {
    Active,
    Expired,
    Revoked,
}

impl BreakGlassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakGlassStatus::Active => "active",
            BreakGlassStatus::Expired => "expired",
            BreakGlassStatus::Revoked => "revoked",
        }
    }
}

/// Time-boxed, justified elevation of a platform operator into a tenant.
///
/// An `Active` row past its expiry is treated as inactive at check time but
/// is not rewritten until the cleanup sweep runs; expiry is live-evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakGlassAccess {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub target_company_id: Uuid,
    pub justification: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: BreakGlassStatus,
}

impl BreakGlassAccess {
    /// Effective right now? Status and expiry both evaluated live.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.status == BreakGlassStatus::Active && self.expires_at > now
    }
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_actions_are_not_optional_gated() {
        for action in PLATFORM_ACTIONS {
            assert!(!is_optional_gated(action));
        }
    }

    #[test]
    fn superadmin_maps_to_wildcard() {
        assert_eq!(role_permissions(Role::Superadmin), &["*"]);
        assert!(!role_permissions(Role::Operative).contains(&"*"));
    }

    #[test]
    fn break_glass_effectiveness_is_live_evaluated() {
        let now = Utc::now();
        let mut grant = BreakGlassAccess {
            id: Uuid::new_v4(),
            admin_id: Uuid::new_v4(),
            target_company_id: Uuid::new_v4(),
            justification: "support ticket 4821".to_string(),
            granted_at: now,
            expires_at: now + chrono::Duration::minutes(60),
            status: BreakGlassStatus::Active,
        };
        assert!(grant.is_effective(now));
        // Past expiry: inactive even though the persisted status says Active
        assert!(!grant.is_effective(now + chrono::Duration::minutes(61)));
        grant.status = BreakGlassStatus::Revoked;
        assert!(!grant.is_effective(now));
    }
}
