use std::time::Duration;

use dbsync_core::ValueError;
use thiserror::Error;

/// Failures raised by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("database file not found: {0}")]
    MissingFile(String),
    #[error("{0}")]
    Invalid(String),
}

impl StoreError {
    /// True when the database rejected a duplicate key.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(err)) => err.is_unique_violation(),
            _ => false,
        }
    }
}
