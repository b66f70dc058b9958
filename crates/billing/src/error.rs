//! Billing error types.

use thiserror::Error;

use crate::ProductId;

/// Errors raised by a billing vendor SDK.
///
/// These stay inside this crate; [`crate::BillingClient`] translates them
/// into [`BillingError`] or a [`crate::PurchaseOutcome`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VendorError {
    /// The user dismissed the purchase sheet.
    #[error("Purchase cancelled by user")]
    UserCancelled,

    /// The vendor could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// A call was made before `configure` succeeded.
    #[error("Vendor SDK is not configured")]
    NotConfigured,

    /// The API key was rejected.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The store declined the purchase.
    #[error("Purchase rejected: {0}")]
    Rejected(String),

    /// The product is not offered by the store.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(ProductId),
}

/// Failure to bind the vendor session at startup.
///
/// Not fatal: purchasing stays disabled until a later `initialize` succeeds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BillingInitError {
    #[error("Billing API key is not configured for this platform")]
    MissingApiKey,

    #[error("Vendor rejected configuration: {0}")]
    Vendor(String),
}

/// Normalized errors from read-only billing queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BillingError {
    /// `initialize` has not succeeded yet.
    #[error("Billing is not initialized")]
    NotInitialized,

    /// The vendor could not answer the query.
    #[error("Billing vendor unavailable: {0}")]
    Unavailable(String),
}

impl From<VendorError> for BillingError {
    fn from(err: VendorError) -> Self {
        match err {
            VendorError::NotConfigured => BillingError::NotInitialized,
            other => BillingError::Unavailable(other.to_string()),
        }
    }
}

/// Convenience type alias for billing results.
pub type Result<T> = std::result::Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_configured_maps_to_not_initialized() {
        assert_eq!(
            BillingError::from(VendorError::NotConfigured),
            BillingError::NotInitialized
        );
    }

    #[test]
    fn other_vendor_errors_become_unavailable() {
        let err = BillingError::from(VendorError::Network("timeout".to_string()));
        assert_eq!(
            err,
            BillingError::Unavailable("Network error: timeout".to_string())
        );
    }
}
