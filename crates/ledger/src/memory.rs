use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    EntitlementRecord, GrantOutcome, GrantRequest, LedgerError, PremiumProjection,
    ProcessedTransaction, ProductId, Result, TransactionId, UserId,
    store::{EntitlementStore, UserStore, UserStream},
};

/// Failures scheduled by tests.
#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    fail_grants: u32,
    drop_grant_acks: u32,
    fail_projections: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<(UserId, ProductId), EntitlementRecord>,
    processed: HashMap<(UserId, TransactionId), ProcessedTransaction>,
    premium: HashMap<UserId, bool>,
    faults: Faults,
}

impl LedgerState {
    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable {
            return Err(LedgerError::StorageUnavailable(
                "in-memory ledger marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory ledger for tests and local development.
///
/// Provides the same interface as the PostgreSQL implementation. Every
/// operation runs under a single lock with no await points inside, so each
/// grant and each projection is atomic. Grants for unrelated user/product
/// pairs therefore serialize too; use `PostgresLedger` where that matters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `StorageUnavailable` until cleared.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.faults.unavailable = unavailable;
    }

    /// Fails the next `n` grants before anything is written.
    pub async fn fail_next_grants(&self, n: u32) {
        self.state.write().await.faults.fail_grants = n;
    }

    /// Applies the next `n` grants but reports them as failed, as if the
    /// response was lost after the commit.
    pub async fn drop_next_grant_acks(&self, n: u32) {
        self.state.write().await.faults.drop_grant_acks = n;
    }

    /// Fails the next `n` premium projections before anything is written.
    pub async fn fail_next_projections(&self, n: u32) {
        self.state.write().await.faults.fail_projections = n;
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Clears all data and scheduled faults.
    pub async fn clear(&self) {
        *self.state.write().await = LedgerState::default();
    }
}

#[async_trait]
impl EntitlementStore for InMemoryLedger {
    async fn grant(&self, request: GrantRequest) -> Result<GrantOutcome> {
        request.validate()?;

        let mut state = self.state.write().await;
        state.check_available()?;

        if state.faults.fail_grants > 0 {
            state.faults.fail_grants -= 1;
            return Err(LedgerError::StorageUnavailable(
                "injected grant failure".to_string(),
            ));
        }

        let key = (request.user_id, request.product_id.clone());
        let now = Utc::now();

        if let Some(ref txn) = request.dedupe_key
            && let Some(existing) = state.processed.get(&(request.user_id, txn.clone()))
        {
            if existing.product_id != request.product_id {
                return Err(LedgerError::TransactionReused {
                    transaction_id: txn.clone(),
                    original_product: existing.product_id.clone(),
                    attempted_product: request.product_id,
                });
            }
            let record = state.records.get(&key).cloned().ok_or_else(|| {
                LedgerError::Inconsistent(format!(
                    "transaction {txn} recorded without an entitlement record"
                ))
            })?;
            return Ok(GrantOutcome {
                record,
                duplicate: true,
            });
        }

        if let Some(txn) = request.dedupe_key.clone() {
            state.processed.insert(
                (request.user_id, txn.clone()),
                ProcessedTransaction {
                    user_id: request.user_id,
                    transaction_id: txn,
                    product_id: request.product_id.clone(),
                    increment: request.increment_by,
                    granted_at: now,
                },
            );
        }

        let record = state
            .records
            .entry(key)
            .and_modify(|r| {
                r.quantity += u64::from(request.increment_by);
                r.updated_at = now;
            })
            .or_insert_with(|| EntitlementRecord {
                user_id: request.user_id,
                product_id: request.product_id.clone(),
                quantity: u64::from(request.increment_by),
                created_at: now,
                updated_at: now,
            })
            .clone();

        if state.faults.drop_grant_acks > 0 {
            state.faults.drop_grant_acks -= 1;
            return Err(LedgerError::StorageUnavailable(
                "injected lost acknowledgement".to_string(),
            ));
        }

        Ok(GrantOutcome {
            record,
            duplicate: false,
        })
    }

    async fn get_record(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<Option<EntitlementRecord>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.records.get(&(user_id, product_id.clone())).cloned())
    }

    async fn records_for_user(&self, user_id: UserId) -> Result<Vec<EntitlementRecord>> {
        let state = self.state.read().await;
        state.check_available()?;
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(records)
    }

    async fn processed_transactions(&self, user_id: UserId) -> Result<Vec<ProcessedTransaction>> {
        let state = self.state.read().await;
        state.check_available()?;
        let mut transactions: Vec<_> = state
            .processed
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            a.granted_at
                .cmp(&b.granted_at)
                .then(a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(transactions)
    }

    async fn stream_users(&self) -> Result<UserStream> {
        use futures_util::stream;

        let state = self.state.read().await;
        state.check_available()?;
        let users: BTreeSet<UserId> = state
            .records
            .keys()
            .map(|(user, _)| *user)
            .chain(state.premium.keys().copied())
            .collect();

        Ok(Box::pin(stream::iter(users.into_iter().map(Ok))))
    }
}

#[async_trait]
impl UserStore for InMemoryLedger {
    async fn is_premium(&self, user_id: UserId) -> Result<bool> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.premium.get(&user_id).copied().unwrap_or(false))
    }

    async fn project_premium(
        &self,
        user_id: UserId,
        premium_products: &[ProductId],
    ) -> Result<PremiumProjection> {
        let mut state = self.state.write().await;
        state.check_available()?;

        if state.faults.fail_projections > 0 {
            state.faults.fail_projections -= 1;
            return Err(LedgerError::StorageUnavailable(
                "injected projection failure".to_string(),
            ));
        }

        let is_premium = premium_products.iter().any(|product| {
            state
                .records
                .get(&(user_id, product.clone()))
                .is_some_and(|r| r.quantity >= 1)
        });

        let previous = state.premium.insert(user_id, is_premium).unwrap_or(false);

        Ok(PremiumProjection {
            is_premium,
            changed: previous != is_premium,
        })
    }
}
