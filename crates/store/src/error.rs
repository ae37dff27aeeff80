use std::time::Duration;

use common::{OrderId, ProductId};
use thiserror::Error;

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE raised when PostgreSQL breaks a deadlock.
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured wait.
    #[error("Timed out after {0:?} waiting for a row lock")]
    LockTimeout(Duration),

    /// The database aborted the transaction to break a lock cycle.
    #[error("Transaction aborted by deadlock detection")]
    Deadlock,

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A stored value could not be mapped into the domain model.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::LockTimeout(_) | StoreError::Deadlock => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            match db_err.code().as_deref() {
                // The server-side timeout value is not reported back.
                Some(LOCK_NOT_AVAILABLE) => return StoreError::LockTimeout(Duration::ZERO),
                Some(DEADLOCK_DETECTED) => return StoreError::Deadlock,
                _ => {}
            }
        }
        StoreError::Database(e)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_failures_are_retryable() {
        assert!(StoreError::LockTimeout(Duration::from_millis(10)).is_retryable());
        assert!(StoreError::Deadlock.is_retryable());
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn missing_rows_are_not_retryable() {
        assert!(!StoreError::ProductNotFound(ProductId::new(1)).is_retryable());
        assert!(!StoreError::InvalidData("bad".into()).is_retryable());
    }
}
