//! Reconciliation error types.

use billing::BillingError;
use ledger::LedgerError;
use thiserror::Error;

use crate::{ProductId, TransactionId, state::PurchaseState};

/// Errors returned by [`crate::Reconciler`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The request carried no valid session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The product is not in the catalog.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// The receipt did not check out. Nothing was granted.
    #[error("Receipt invalid: {0}")]
    ReceiptInvalid(String),

    /// The transaction was already granted for another product.
    #[error("Transaction {transaction_id} was already used for {original_product}")]
    TransactionReused {
        transaction_id: TransactionId,
        original_product: ProductId,
    },

    #[error("Invalid increment: {0}")]
    InvalidIncrement(u32),

    /// The grant or projection could not be completed. When `retryable`,
    /// repeating the call with the same transaction is safe.
    #[error("Reconcile failed: {reason}")]
    ReconcileFailed { retryable: bool, reason: String },
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::ReconcileFailed {
                retryable: true,
                ..
            }
        )
    }

    /// A retryable failure after the retry budget ran out.
    pub(crate) fn exhausted(reason: impl std::fmt::Display) -> Self {
        ReconcileError::ReconcileFailed {
            retryable: true,
            reason: reason.to_string(),
        }
    }
}

impl From<LedgerError> for ReconcileError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotAuthenticated => ReconcileError::NotAuthenticated,
            LedgerError::InvalidIncrement(n) => ReconcileError::InvalidIncrement(n),
            LedgerError::TransactionReused {
                transaction_id,
                original_product,
                ..
            } => ReconcileError::TransactionReused {
                transaction_id,
                original_product,
            },
            other => ReconcileError::ReconcileFailed {
                retryable: other.is_retryable(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<projections::ProjectionError> for ReconcileError {
    fn from(err: projections::ProjectionError) -> Self {
        match err {
            projections::ProjectionError::Ledger(e) => e.into(),
            other => ReconcileError::ReconcileFailed {
                retryable: other.is_retryable(),
                reason: other.to_string(),
            },
        }
    }
}

/// Convenience type alias for reconciliation results.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors from driving a [`crate::PurchaseFlow`].
#[derive(Debug, Error)]
pub enum FlowError {
    /// The flow is not in a state that allows the requested step.
    #[error("Invalid purchase state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: &'static str,
        actual: PurchaseState,
    },

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_outage_is_retryable() {
        let err: ReconcileError = LedgerError::StorageUnavailable("down".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn inconsistency_is_not_retryable() {
        let err: ReconcileError = LedgerError::Inconsistent("bad".into()).into();
        assert!(matches!(
            err,
            ReconcileError::ReconcileFailed {
                retryable: false,
                ..
            }
        ));
    }

    #[test]
    fn ledger_auth_failure_keeps_its_meaning() {
        let err: ReconcileError = LedgerError::NotAuthenticated.into();
        assert_eq!(err, ReconcileError::NotAuthenticated);
    }

    #[test]
    fn reused_transaction_is_preserved() {
        let err: ReconcileError = LedgerError::TransactionReused {
            transaction_id: "TXN-1".into(),
            original_product: "batman_badge".into(),
            attempted_product: "premium_lifetime".into(),
        }
        .into();
        assert!(matches!(err, ReconcileError::TransactionReused { .. }));
        assert!(!err.is_retryable());
    }
}
