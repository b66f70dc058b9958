//! Receipt verification.
//!
//! Every grant is preceded by a verification step. The reconciler only sees
//! the [`ReceiptVerifier`] trait, so the policy is chosen at wiring time.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{BillingVendor, ProductId, TransactionId, UserId};

/// How a receipt was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptSource {
    /// Confirmed against the vendor's server API.
    Vendor,
    /// Accepted on the client's word.
    Trusted,
}

/// A purchase the verifier accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedReceipt {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub transaction_id: Option<TransactionId>,
    pub source: ReceiptSource,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("No transaction id supplied")]
    MissingTransaction,

    #[error("Vendor has no transaction {0}")]
    UnknownTransaction(TransactionId),

    #[error("Transaction {transaction_id} belongs to another user")]
    WrongUser { transaction_id: TransactionId },

    #[error("Transaction {transaction_id} is for {actual}, not {asserted}")]
    ProductMismatch {
        transaction_id: TransactionId,
        asserted: ProductId,
        actual: ProductId,
    },

    /// The vendor could not be asked. The receipt may still be valid.
    #[error("Verification unavailable: {0}")]
    Unavailable(String),
}

impl VerificationError {
    /// Returns true if asking again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerificationError::Unavailable(_))
    }
}

/// Checks a client-asserted purchase before it is granted.
#[async_trait]
pub trait ReceiptVerifier: Send + Sync {
    async fn verify(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        transaction_id: Option<&TransactionId>,
    ) -> Result<VerifiedReceipt, VerificationError>;
}

/// Verifies receipts through the vendor's transaction lookup.
///
/// The transaction must exist, belong to the caller, and be for the asserted
/// product.
#[derive(Clone)]
pub struct VendorReceiptVerifier {
    vendor: Arc<dyn BillingVendor>,
}

impl VendorReceiptVerifier {
    pub fn new(vendor: Arc<dyn BillingVendor>) -> Self {
        Self { vendor }
    }
}

#[async_trait]
impl ReceiptVerifier for VendorReceiptVerifier {
    #[tracing::instrument(skip(self, product_id, transaction_id), fields(product_id = %product_id))]
    async fn verify(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        transaction_id: Option<&TransactionId>,
    ) -> Result<VerifiedReceipt, VerificationError> {
        let transaction_id = transaction_id.ok_or(VerificationError::MissingTransaction)?;

        let transaction = self
            .vendor
            .lookup_transaction(transaction_id)
            .await
            .map_err(|e| VerificationError::Unavailable(e.to_string()))?
            .ok_or_else(|| VerificationError::UnknownTransaction(transaction_id.clone()))?;

        if transaction.app_user_id != user_id {
            tracing::warn!(%transaction_id, "receipt presented by another user");
            return Err(VerificationError::WrongUser {
                transaction_id: transaction_id.clone(),
            });
        }
        if &transaction.product_id != product_id {
            return Err(VerificationError::ProductMismatch {
                transaction_id: transaction_id.clone(),
                asserted: product_id.clone(),
                actual: transaction.product_id,
            });
        }

        Ok(VerifiedReceipt {
            user_id,
            product_id: product_id.clone(),
            transaction_id: Some(transaction_id.clone()),
            source: ReceiptSource::Vendor,
        })
    }
}

/// Accepts every assertion as made.
///
/// Legacy behavior for deployments without vendor server access.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustingVerifier;

#[async_trait]
impl ReceiptVerifier for TrustingVerifier {
    async fn verify(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        transaction_id: Option<&TransactionId>,
    ) -> Result<VerifiedReceipt, VerificationError> {
        Ok(VerifiedReceipt {
            user_id,
            product_id: product_id.clone(),
            transaction_id: transaction_id.cloned(),
            source: ReceiptSource::Trusted,
        })
    }
}

/// Stands in when vendor verification is configured but unusable, e.g. the
/// server API key is missing. Every receipt is reported as unverifiable.
#[derive(Debug, Clone)]
pub struct DisabledVerifier {
    reason: String,
}

impl DisabledVerifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ReceiptVerifier for DisabledVerifier {
    async fn verify(
        &self,
        _user_id: UserId,
        _product_id: &ProductId,
        _transaction_id: Option<&TransactionId>,
    ) -> Result<VerifiedReceipt, VerificationError> {
        Err(VerificationError::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryVendor;

    async fn setup() -> (InMemoryVendor, VendorReceiptVerifier, UserId, TransactionId) {
        let vendor = InMemoryVendor::new();
        let verifier = VendorReceiptVerifier::new(Arc::new(vendor.clone()));
        let user = UserId::new();
        let txn = vendor.complete_purchase_offline(user, "batman_badge").await;
        (vendor, verifier, user, txn.transaction_id)
    }

    #[tokio::test]
    async fn genuine_receipt_is_verified() {
        let (_, verifier, user, txn) = setup().await;

        let receipt = verifier
            .verify(user, &ProductId::new("batman_badge"), Some(&txn))
            .await
            .unwrap();

        assert_eq!(receipt.source, ReceiptSource::Vendor);
        assert_eq!(receipt.transaction_id, Some(txn));
    }

    #[tokio::test]
    async fn missing_transaction_is_rejected() {
        let (_, verifier, user, _) = setup().await;
        let result = verifier
            .verify(user, &ProductId::new("batman_badge"), None)
            .await;
        assert_eq!(result, Err(VerificationError::MissingTransaction));
    }

    #[tokio::test]
    async fn unknown_transaction_is_rejected() {
        let (_, verifier, user, _) = setup().await;
        let bogus = TransactionId::new("TXN-FAKE");
        let result = verifier
            .verify(user, &ProductId::new("batman_badge"), Some(&bogus))
            .await;
        assert_eq!(result, Err(VerificationError::UnknownTransaction(bogus)));
    }

    #[tokio::test]
    async fn another_users_receipt_is_rejected() {
        let (_, verifier, _, txn) = setup().await;
        let result = verifier
            .verify(UserId::new(), &ProductId::new("batman_badge"), Some(&txn))
            .await;
        assert!(matches!(result, Err(VerificationError::WrongUser { .. })));
    }

    #[tokio::test]
    async fn receipt_for_cheaper_product_is_rejected() {
        let (_, verifier, user, txn) = setup().await;
        let result = verifier
            .verify(user, &ProductId::new("premium_lifetime"), Some(&txn))
            .await;
        assert!(matches!(
            result,
            Err(VerificationError::ProductMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn vendor_outage_is_retryable() {
        let (vendor, verifier, user, txn) = setup().await;
        vendor.fail_next_calls(1).await;

        let err = verifier
            .verify(user, &ProductId::new("batman_badge"), Some(&txn))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn disabled_verifier_reports_unavailable() {
        let verifier = DisabledVerifier::new("billing API key missing");
        let err = verifier
            .verify(UserId::new(), &ProductId::new("batman_badge"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VerificationError::Unavailable("billing API key missing".to_string())
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn trusting_verifier_accepts_anything() {
        let receipt = TrustingVerifier
            .verify(UserId::new(), &ProductId::new("premium_lifetime"), None)
            .await
            .unwrap();
        assert_eq!(receipt.source, ReceiptSource::Trusted);
        assert!(receipt.transaction_id.is_none());
    }
}
