use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    EntitlementRecord, GrantOutcome, GrantRequest, PremiumProjection, ProcessedTransaction,
    ProductId, Result, UserId,
};

/// A stream of users known to the store.
pub type UserStream = Pin<Box<dyn Stream<Item = Result<UserId>> + Send>>;

/// Durable storage for entitlement records.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Applies a grant as a single atomic read-modify-write on the
    /// `(user, product)` record.
    ///
    /// When the request carries a dedupe key, the key is recorded in the
    /// same atomic unit as the increment. A repeated key for the same product
    /// returns the current record with `duplicate = true`; a repeated key for
    /// a different product fails with `TransactionReused`.
    async fn grant(&self, request: GrantRequest) -> Result<GrantOutcome>;

    /// Retrieves the record for a `(user, product)` pair, if one exists.
    async fn get_record(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<Option<EntitlementRecord>>;

    /// Retrieves every record owned by a user, ordered by product.
    async fn records_for_user(&self, user_id: UserId) -> Result<Vec<EntitlementRecord>>;

    /// Retrieves the transactions applied for a user, oldest first.
    async fn processed_transactions(&self, user_id: UserId) -> Result<Vec<ProcessedTransaction>>;

    /// Streams every user that owns a record or has a user row.
    async fn stream_users(&self) -> Result<UserStream>;
}

/// Storage for the derived fields on the user record.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Reads the stored premium flag. Unknown users are not premium.
    async fn is_premium(&self, user_id: UserId) -> Result<bool>;

    /// Recomputes the premium flag from the user's records and persists it
    /// if it changed.
    ///
    /// The read of the records and the write of the flag are serialized per
    /// user, so a reprojection that started earlier can never overwrite the
    /// result of one that observed a later grant.
    async fn project_premium(
        &self,
        user_id: UserId,
        premium_products: &[ProductId],
    ) -> Result<PremiumProjection>;
}

/// Convenience reads available on every entitlement store.
#[async_trait]
pub trait EntitlementStoreExt: EntitlementStore {
    /// Returns the quantity owned, or 0 when no record exists.
    async fn get_quantity(&self, user_id: UserId, product_id: &ProductId) -> Result<u64> {
        Ok(self
            .get_record(user_id, product_id)
            .await?
            .map_or(0, |r| r.quantity))
    }
}

impl<T: EntitlementStore + ?Sized> EntitlementStoreExt for T {}
