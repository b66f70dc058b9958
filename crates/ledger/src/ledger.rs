//! Authenticated entry point to an entitlement store.

use crate::{
    Caller, EntitlementRecord, GrantOutcome, GrantRequest, ProductId, Result, TransactionId,
    UserId,
    store::{EntitlementStore, EntitlementStoreExt},
};

/// Entitlement ledger bound to a store.
///
/// Every mutation must come from an authenticated caller; anonymous calls
/// are rejected before the store is touched.
#[derive(Debug, Clone)]
pub struct EntitlementLedger<S: EntitlementStore> {
    store: S,
}

impl<S: EntitlementStore> EntitlementLedger<S> {
    /// Creates a ledger over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Grants `increment_by` units of a product to the calling user.
    ///
    /// With a dedupe key, repeating the call is a no-op that returns the
    /// current record. Without one, every call increments.
    #[tracing::instrument(skip(self), fields(user_id = tracing::field::Empty))]
    pub async fn grant(
        &self,
        caller: &Caller,
        product_id: &ProductId,
        increment_by: u32,
        dedupe_key: Option<TransactionId>,
    ) -> Result<GrantOutcome> {
        let user_id = caller.user_id()?;
        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        let mut request = GrantRequest::new(user_id, product_id.clone()).increment_by(increment_by);
        request.dedupe_key = dedupe_key;

        let outcome = self.store.grant(request).await?;

        if outcome.duplicate {
            metrics::counter!("ledger_duplicate_grants_total").increment(1);
            tracing::info!(quantity = outcome.record.quantity, "grant already applied");
        } else {
            metrics::counter!("ledger_grants_total").increment(1);
            tracing::info!(quantity = outcome.record.quantity, "grant applied");
        }

        Ok(outcome)
    }

    /// Returns the quantity a user owns, 0 when there is no record.
    pub async fn get_quantity(&self, user_id: UserId, product_id: &ProductId) -> Result<u64> {
        self.store.get_quantity(user_id, product_id).await
    }

    /// Returns every record owned by a user.
    pub async fn records_for_user(&self, user_id: UserId) -> Result<Vec<EntitlementRecord>> {
        self.store.records_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryLedger, LedgerError};

    #[tokio::test]
    async fn anonymous_grant_never_reaches_store() {
        let store = InMemoryLedger::new();
        let ledger = EntitlementLedger::new(store.clone());

        let result = ledger
            .grant(&Caller::Anonymous, &"batman_badge".into(), 1, None)
            .await;

        assert!(matches!(result, Err(LedgerError::NotAuthenticated)));
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn authenticated_grant_increments() {
        let ledger = EntitlementLedger::new(InMemoryLedger::new());
        let user = UserId::new();
        let product = ProductId::new("batman_badge");

        ledger
            .grant(&Caller::User(user), &product, 2, None)
            .await
            .unwrap();

        assert_eq!(ledger.get_quantity(user, &product).await.unwrap(), 2);
        assert_eq!(ledger.records_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dedupe_key_is_forwarded() {
        let ledger = EntitlementLedger::new(InMemoryLedger::new());
        let caller = Caller::User(UserId::new());
        let product = ProductId::new("batman_badge");

        ledger
            .grant(&caller, &product, 1, Some("TXN-1".into()))
            .await
            .unwrap();
        let repeat = ledger
            .grant(&caller, &product, 1, Some("TXN-1".into()))
            .await
            .unwrap();

        assert!(repeat.duplicate);
        assert_eq!(repeat.record.quantity, 1);
    }
}
