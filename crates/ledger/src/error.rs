use thiserror::Error;

use crate::{ProductId, TransactionId};

/// Errors that can occur when interacting with the entitlement ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The call did not carry an authenticated user.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Grants must increase quantity by at least one.
    #[error("Invalid increment: {0}")]
    InvalidIncrement(u32),

    /// The transaction was already applied to a different product.
    #[error(
        "Transaction {transaction_id} was already granted for {original_product}, refusing to grant {attempted_product}"
    )]
    TransactionReused {
        transaction_id: TransactionId,
        original_product: ProductId,
        attempted_product: ProductId,
    },

    /// The durable store is temporarily unreachable.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Stored data violates a ledger invariant.
    #[error("Inconsistent ledger state: {0}")]
    Inconsistent(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// Returns true if the operation may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::StorageUnavailable(_) => true,
            LedgerError::Database(err) => is_transient_database_error(err),
            _ => false,
        }
    }
}

fn is_transient_database_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // serialization_failure / deadlock_detected
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_unavailable_is_retryable() {
        assert!(LedgerError::StorageUnavailable("down".into()).is_retryable());
        assert!(LedgerError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn caller_errors_are_not_retryable() {
        assert!(!LedgerError::NotAuthenticated.is_retryable());
        assert!(!LedgerError::InvalidIncrement(0).is_retryable());
        assert!(!LedgerError::Database(sqlx::Error::RowNotFound).is_retryable());
    }
}
