//! In-memory billing vendor for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog::ProductCatalog;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    BillingVendor, CustomerInfo, ProductId, StoreProduct, StoreTransaction, TransactionId, UserId,
    VendorError,
};

#[derive(Debug, Default)]
struct VendorState {
    products: HashMap<ProductId, StoreProduct>,
    configured: Option<UserId>,
    transactions: Vec<StoreTransaction>,
    next_id: u32,
    latency: Duration,
    fail_calls: u32,
    cancel_purchases: u32,
    reject_purchases: bool,
}

/// In-memory billing vendor.
///
/// Supports failure, cancellation and latency injection. Transaction IDs are
/// sequential (`TXN-0001`, `TXN-0002`, ...).
#[derive(Debug, Clone, Default)]
pub struct InMemoryVendor {
    state: Arc<RwLock<VendorState>>,
}

impl InMemoryVendor {
    /// Creates a vendor that offers no products.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vendor that offers every product in the catalog.
    pub fn from_catalog(catalog: &ProductCatalog) -> Self {
        let products = catalog
            .products()
            .map(|p| {
                (
                    p.id.clone(),
                    StoreProduct {
                        id: p.id.clone(),
                        title: p.title.clone(),
                        price: p.price,
                    },
                )
            })
            .collect();

        Self {
            state: Arc::new(RwLock::new(VendorState {
                products,
                ..VendorState::default()
            })),
        }
    }

    /// Adds a product to the store listing.
    pub async fn add_product(&self, product: StoreProduct) {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Delays every purchase by `latency` before it completes.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    /// Fails the next `n` vendor calls with a network error.
    pub async fn fail_next_calls(&self, n: u32) {
        self.state.write().await.fail_calls = n;
    }

    /// Makes the next `n` purchases end with the user dismissing the sheet.
    pub async fn cancel_next_purchases(&self, n: u32) {
        self.state.write().await.cancel_purchases = n;
    }

    /// Makes the store decline every purchase.
    pub async fn set_reject_purchases(&self, reject: bool) {
        self.state.write().await.reject_purchases = reject;
    }

    /// Records a completed purchase that the client never saw, as happens
    /// when the app dies while the purchase sheet is open.
    pub async fn complete_purchase_offline(
        &self,
        app_user_id: UserId,
        product_id: impl Into<ProductId>,
    ) -> StoreTransaction {
        let mut state = self.state.write().await;
        Self::record(&mut state, app_user_id, product_id.into())
    }

    /// Returns the number of completed transactions across all users.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    fn record(
        state: &mut VendorState,
        app_user_id: UserId,
        product_id: ProductId,
    ) -> StoreTransaction {
        state.next_id += 1;
        let transaction = StoreTransaction {
            transaction_id: TransactionId::new(format!("TXN-{:04}", state.next_id)),
            product_id,
            app_user_id,
            purchased_at: Utc::now(),
        };
        state.transactions.push(transaction.clone());
        transaction
    }

    fn take_failure(state: &mut VendorState) -> Result<(), VendorError> {
        if state.fail_calls > 0 {
            state.fail_calls -= 1;
            return Err(VendorError::Network("connection reset".to_string()));
        }
        Ok(())
    }

    fn customer_info(state: &VendorState, app_user_id: UserId) -> CustomerInfo {
        CustomerInfo {
            app_user_id,
            transactions: state
                .transactions
                .iter()
                .filter(|t| t.app_user_id == app_user_id)
                .cloned()
                .collect(),
        }
    }
}

#[async_trait]
impl BillingVendor for InMemoryVendor {
    async fn configure(&self, api_key: &str, app_user_id: UserId) -> Result<(), VendorError> {
        let mut state = self.state.write().await;
        Self::take_failure(&mut state)?;

        if api_key.trim().is_empty() {
            return Err(VendorError::InvalidApiKey);
        }
        state.configured = Some(app_user_id);
        Ok(())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<StoreProduct>, VendorError> {
        let mut state = self.state.write().await;
        Self::take_failure(&mut state)?;

        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn purchase_store_product(
        &self,
        app_user_id: UserId,
        product: &StoreProduct,
    ) -> Result<StoreTransaction, VendorError> {
        let latency = self.state.read().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.write().await;
        Self::take_failure(&mut state)?;

        if state.configured != Some(app_user_id) {
            return Err(VendorError::NotConfigured);
        }
        if state.cancel_purchases > 0 {
            state.cancel_purchases -= 1;
            return Err(VendorError::UserCancelled);
        }
        if state.reject_purchases {
            return Err(VendorError::Rejected("payment declined".to_string()));
        }
        if !state.products.contains_key(&product.id) {
            return Err(VendorError::ProductUnavailable(product.id.clone()));
        }

        Ok(Self::record(&mut state, app_user_id, product.id.clone()))
    }

    async fn restore_purchases(&self, app_user_id: UserId) -> Result<CustomerInfo, VendorError> {
        let mut state = self.state.write().await;
        Self::take_failure(&mut state)?;
        Ok(Self::customer_info(&state, app_user_id))
    }

    async fn get_customer_info(&self, app_user_id: UserId) -> Result<CustomerInfo, VendorError> {
        let mut state = self.state.write().await;
        Self::take_failure(&mut state)?;
        Ok(Self::customer_info(&state, app_user_id))
    }

    async fn lookup_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<StoreTransaction>, VendorError> {
        let mut state = self.state.write().await;
        Self::take_failure(&mut state)?;

        Ok(state
            .transactions
            .iter()
            .find(|t| &t.transaction_id == transaction_id)
            .cloned())
    }
}
