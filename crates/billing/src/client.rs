//! Client-side billing adapter.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    BillingError, BillingInitError, BillingVendor, ProductId, Result, StoreProduct,
    StoreTransaction, UserId, VendorError,
};

/// Result of a purchase attempt.
///
/// `UserCancelled` is a normal outcome, not an error, and never carries a
/// message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Succeeded(StoreTransaction),
    UserCancelled,
    Failed(String),
}

impl PurchaseOutcome {
    fn label(&self) -> &'static str {
        match self {
            PurchaseOutcome::Succeeded(_) => "succeeded",
            PurchaseOutcome::UserCancelled => "cancelled",
            PurchaseOutcome::Failed(_) => "failed",
        }
    }
}

/// The vendor's view of the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSnapshot {
    pub user_id: UserId,
    pub transactions: Vec<StoreTransaction>,
}

impl CustomerSnapshot {
    /// Returns true if the vendor has any transaction for the product.
    pub fn has_purchased(&self, product_id: &ProductId) -> bool {
        self.transactions.iter().any(|t| &t.product_id == product_id)
    }
}

/// Wraps a [`BillingVendor`] for one app session.
///
/// Nothing here mutates application state; every call goes to the vendor.
pub struct BillingClient {
    vendor: Arc<dyn BillingVendor>,
    api_key: Option<String>,
    session: RwLock<Option<UserId>>,
}

impl BillingClient {
    /// Creates an adapter. `api_key` is `None` when the platform key is not
    /// configured; `initialize` then fails and purchasing stays disabled.
    pub fn new(vendor: Arc<dyn BillingVendor>, api_key: Option<String>) -> Self {
        Self {
            vendor,
            api_key,
            session: RwLock::new(None),
        }
    }

    /// Binds the vendor session to a user.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self, user_id: UserId) -> std::result::Result<(), BillingInitError> {
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            tracing::warn!("billing API key missing; purchases disabled");
            return Err(BillingInitError::MissingApiKey);
        };

        self.vendor
            .configure(api_key, user_id)
            .await
            .map_err(|e| BillingInitError::Vendor(e.to_string()))?;

        *self.session.write().await = Some(user_id);
        tracing::info!("billing initialized");
        Ok(())
    }

    /// Returns true once `initialize` has succeeded.
    pub async fn is_initialized(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn current_user(&self) -> Result<UserId> {
        self.session
            .read()
            .await
            .ok_or(BillingError::NotInitialized)
    }

    /// Fetches store products by identifier.
    pub async fn fetch_products(&self, ids: &[ProductId]) -> Result<Vec<StoreProduct>> {
        self.current_user().await?;
        Ok(self.vendor.get_products(ids).await?)
    }

    /// Purchases a product.
    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn purchase(&self, product_id: &ProductId) -> PurchaseOutcome {
        let outcome = self.run_purchase(product_id).await;
        metrics::counter!("billing_purchases_total", "outcome" => outcome.label()).increment(1);

        match &outcome {
            PurchaseOutcome::Succeeded(txn) => {
                tracing::info!(transaction_id = %txn.transaction_id, "purchase succeeded")
            }
            PurchaseOutcome::UserCancelled => tracing::debug!("purchase cancelled by user"),
            PurchaseOutcome::Failed(reason) => tracing::warn!(%reason, "purchase failed"),
        }
        outcome
    }

    /// Purchases a product, abandoning the vendor call if `cancel` resolves
    /// first.
    ///
    /// An abandoned purchase reports `UserCancelled`. If the store completed
    /// it anyway, the transaction shows up in `get_customer_info`.
    pub async fn purchase_cancellable<F>(&self, product_id: &ProductId, cancel: F) -> PurchaseOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            outcome = self.purchase(product_id) => outcome,
            _ = cancel => {
                metrics::counter!("billing_purchases_total", "outcome" => "abandoned").increment(1);
                tracing::info!(product_id = %product_id, "purchase abandoned");
                PurchaseOutcome::UserCancelled
            }
        }
    }

    async fn run_purchase(&self, product_id: &ProductId) -> PurchaseOutcome {
        let user_id = match self.current_user().await {
            Ok(user_id) => user_id,
            Err(e) => return PurchaseOutcome::Failed(e.to_string()),
        };

        let product = match self.vendor.get_products(std::slice::from_ref(product_id)).await {
            Ok(products) => match products.into_iter().find(|p| &p.id == product_id) {
                Some(product) => product,
                None => {
                    return PurchaseOutcome::Failed(
                        VendorError::ProductUnavailable(product_id.clone()).to_string(),
                    );
                }
            },
            Err(e) => return PurchaseOutcome::Failed(e.to_string()),
        };

        match self.vendor.purchase_store_product(user_id, &product).await {
            Ok(transaction) => PurchaseOutcome::Succeeded(transaction),
            Err(VendorError::UserCancelled) => PurchaseOutcome::UserCancelled,
            Err(e) => PurchaseOutcome::Failed(e.to_string()),
        }
    }

    /// Re-syncs past purchases with the store.
    pub async fn restore_purchases(&self) -> Result<Vec<StoreTransaction>> {
        let user_id = self.current_user().await?;
        let info = self.vendor.restore_purchases(user_id).await?;
        Ok(info.transactions)
    }

    /// Reads the vendor's current view of the user.
    pub async fn get_customer_info(&self) -> Result<CustomerSnapshot> {
        let user_id = self.current_user().await?;
        let info = self.vendor.get_customer_info(user_id).await?;
        Ok(CustomerSnapshot {
            user_id: info.app_user_id,
            transactions: info.transactions,
        })
    }
}
