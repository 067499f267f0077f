// Tenant isolation and access control core.
//
// Guarantees that no request can read or mutate data belonging to a tenant
// other than the one the caller is authorized for, with controlled and
// audited exceptions (break-glass access, optional permission grants),
// per-tenant rate limiting, and saga-style tenant provisioning.
//
// Authentication, routing, storage engine and UI live elsewhere; this
// crate consumes a resolved `Principal` from the request extensions and
// exposes middleware, engines and store ports.

pub mod audit;
pub mod config;
pub mod database;
pub mod error;
pub mod guard;
pub mod middleware;
pub mod permissions;
pub mod provisioning;
pub mod rate_limit;
pub mod types;

pub use error::ApiError;
pub use types::{Principal, Role};

/// Install the default subscriber: env-filtered fmt output. Binaries call
/// this once at startup; embedding services that bring their own
/// subscriber skip it.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
