pub mod manager;
pub mod stores;

use thiserror::Error;

/// Failure surfaced by any store port. Callers decide fail-open vs
/// fail-closed; the stores themselves only report.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub use manager::{DatabaseError, DatabaseManager};
