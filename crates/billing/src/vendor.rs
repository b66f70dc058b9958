//! Vendor SDK surface.

use async_trait::async_trait;
use catalog::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProductId, TransactionId, UserId, VendorError};

/// A product as the store presents it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProduct {
    pub id: ProductId,
    pub title: String,
    pub price: Money,
}

/// A completed store purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTransaction {
    pub transaction_id: TransactionId,
    pub product_id: ProductId,
    pub app_user_id: UserId,
    pub purchased_at: DateTime<Utc>,
}

/// Everything the vendor knows about a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub app_user_id: UserId,
    /// Completed transactions, oldest first.
    pub transactions: Vec<StoreTransaction>,
}

/// Billing vendor SDK.
///
/// The client-side calls mirror the vendor's mobile SDK. `lookup_transaction`
/// is the vendor's server API and is only used for receipt verification.
#[async_trait]
pub trait BillingVendor: Send + Sync {
    /// Binds the SDK to an API key and app user.
    async fn configure(&self, api_key: &str, app_user_id: UserId) -> Result<(), VendorError>;

    /// Fetches store products by identifier. Unknown identifiers are omitted.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<StoreProduct>, VendorError>;

    /// Runs the store purchase sheet for a product.
    async fn purchase_store_product(
        &self,
        app_user_id: UserId,
        product: &StoreProduct,
    ) -> Result<StoreTransaction, VendorError>;

    /// Re-syncs the user's past purchases with the store.
    async fn restore_purchases(&self, app_user_id: UserId) -> Result<CustomerInfo, VendorError>;

    /// Reads the user's current purchase state.
    async fn get_customer_info(&self, app_user_id: UserId) -> Result<CustomerInfo, VendorError>;

    /// Looks up a transaction by identifier.
    async fn lookup_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<StoreTransaction>, VendorError>;
}
