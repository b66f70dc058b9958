//! Server-side reconciliation of client-asserted purchases.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use billing::{ReceiptVerifier, VerificationError};
use catalog::ProductCatalog;
use ledger::{
    Caller, EntitlementLedger, EntitlementRecord, EntitlementStore, GrantOutcome, UserStore,
};
use projections::PremiumProjector;
use serde::{Deserialize, Serialize};

use crate::{
    ProductId, ReconcileError, Result, RetryPolicy, SessionResolver, TransactionId, UserId,
};

/// What the client claims to have bought. The user comes from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseAssertion {
    pub product_id: ProductId,
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
}

impl PurchaseAssertion {
    pub fn new(product_id: impl Into<ProductId>) -> Self {
        Self {
            product_id: product_id.into(),
            transaction_id: None,
        }
    }

    pub fn with_transaction(mut self, transaction_id: impl Into<TransactionId>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

/// Result of a successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub success: bool,
    pub product_id: ProductId,
    /// Quantity owned after the grant.
    pub quantity: u64,
    pub is_premium: bool,
    /// The transaction had already been granted; nothing changed.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    pub retry: RetryPolicy,
    /// Reject assertions that carry no vendor transaction id. When false,
    /// such assertions are granted without deduplication.
    pub require_transaction_id: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            require_transaction_id: true,
        }
    }
}

/// The reconcile entry point as seen by a client.
#[async_trait]
pub trait ReconcileBackend: Send + Sync {
    async fn reconcile_purchase(
        &self,
        token: Option<&str>,
        assertion: PurchaseAssertion,
    ) -> Result<ReconcileResponse>;
}

/// Authenticated entry point that turns a verified purchase into a ledger
/// grant and keeps the premium flag in step.
///
/// Sessions, catalog, verifier and store are all injected.
pub struct Reconciler<S>
where
    S: EntitlementStore + UserStore + Clone,
{
    sessions: Arc<dyn SessionResolver>,
    catalog: Arc<ProductCatalog>,
    verifier: Arc<dyn ReceiptVerifier>,
    ledger: EntitlementLedger<S>,
    projector: PremiumProjector<S>,
    config: ReconcilerConfig,
}

impl<S> Reconciler<S>
where
    S: EntitlementStore + UserStore + Clone,
{
    pub fn new(
        store: S,
        catalog: Arc<ProductCatalog>,
        sessions: Arc<dyn SessionResolver>,
        verifier: Arc<dyn ReceiptVerifier>,
        config: ReconcilerConfig,
    ) -> Self {
        let projector = PremiumProjector::new(store.clone(), &catalog);
        Self {
            sessions,
            catalog,
            verifier,
            ledger: EntitlementLedger::new(store),
            projector,
            config,
        }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn projector(&self) -> &PremiumProjector<S> {
        &self.projector
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Verifies a purchase and grants one unit of the product to the caller.
    ///
    /// Steps, each of which must succeed before the next runs:
    /// 1. resolve the caller from the session token
    /// 2. check the product against the catalog
    /// 3. verify the receipt
    /// 4. grant, keyed on the vendor transaction id
    /// 5. reproject premium status for premium products
    ///
    /// Repeating a call with the same transaction id never grants twice.
    #[tracing::instrument(
        skip(self, token, assertion),
        fields(
            product_id = %assertion.product_id,
            transaction_id = ?assertion.transaction_id,
            user_id = tracing::field::Empty,
        )
    )]
    pub async fn reconcile_purchase(
        &self,
        token: Option<&str>,
        assertion: PurchaseAssertion,
    ) -> Result<ReconcileResponse> {
        metrics::counter!("reconcile_requests_total").increment(1);
        let start = Instant::now();

        let result = self.run(token, assertion).await;

        metrics::histogram!("reconcile_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(response) => {
                metrics::counter!("reconcile_succeeded").increment(1);
                if response.duplicate {
                    metrics::counter!("reconcile_duplicates").increment(1);
                }
                tracing::info!(
                    quantity = response.quantity,
                    is_premium = response.is_premium,
                    duplicate = response.duplicate,
                    "purchase reconciled"
                );
            }
            Err(e) => {
                metrics::counter!("reconcile_failed").increment(1);
                tracing::warn!(error = %e, retryable = e.is_retryable(), "reconcile failed");
            }
        }

        result
    }

    async fn run(
        &self,
        token: Option<&str>,
        assertion: PurchaseAssertion,
    ) -> Result<ReconcileResponse> {
        // 1. Resolve the caller
        let caller = self.sessions.caller(token).await;
        let user_id = caller
            .user_id()
            .map_err(|_| ReconcileError::NotAuthenticated)?;
        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        // 2. Validate the product
        let product = self
            .catalog
            .validate(&assertion.product_id)
            .map_err(|_| ReconcileError::UnknownProduct(assertion.product_id.clone()))?;

        // 3. Verify the receipt
        if self.config.require_transaction_id && assertion.transaction_id.is_none() {
            return Err(ReconcileError::ReceiptInvalid(
                VerificationError::MissingTransaction.to_string(),
            ));
        }
        let receipt = self
            .config
            .retry
            .run("verify_receipt", |_| {
                self.verifier.verify(
                    user_id,
                    &product.id,
                    assertion.transaction_id.as_ref(),
                )
            })
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    ReconcileError::exhausted(e)
                } else {
                    ReconcileError::ReceiptInvalid(e.to_string())
                }
            })?;
        tracing::debug!(source = ?receipt.source, "receipt verified");

        // 4. Grant
        let outcome = self
            .grant_with_retry(&caller, &product.id, receipt.transaction_id)
            .await?;

        // 5. Reproject
        let is_premium = if self.projector.affects_premium(&product.id) {
            self.config
                .retry
                .run("reproject_premium", |_| self.projector.reproject(user_id))
                .await
                .map_err(retry_failure)?
        } else {
            self.config
                .retry
                .run("read_premium", |_| self.projector.is_premium(user_id))
                .await
                .map_err(retry_failure)?
        };

        Ok(ReconcileResponse {
            success: true,
            product_id: product.id.clone(),
            quantity: outcome.record.quantity,
            is_premium,
            duplicate: outcome.duplicate,
        })
    }

    async fn grant_with_retry(
        &self,
        caller: &Caller,
        product_id: &ProductId,
        dedupe_key: Option<TransactionId>,
    ) -> Result<GrantOutcome> {
        // Without a dedupe key a lost acknowledgement followed by a retry
        // would grant twice.
        let policy = if dedupe_key.is_some() {
            self.config.retry
        } else {
            RetryPolicy::no_retry()
        };

        policy
            .run("grant", |attempt| {
                if attempt > 1 {
                    metrics::counter!("ledger_grant_retries_total").increment(1);
                }
                self.ledger.grant(caller, product_id, 1, dedupe_key.clone())
            })
            .await
            .map_err(retry_failure)
    }

    /// Returns every entitlement the caller owns.
    pub async fn entitlements(&self, token: Option<&str>) -> Result<Vec<EntitlementRecord>> {
        let user_id = self.authenticate(token).await?;
        Ok(self.ledger.records_for_user(user_id).await?)
    }

    /// Returns how many units of a product the caller owns.
    pub async fn quantity(&self, token: Option<&str>, product_id: &ProductId) -> Result<u64> {
        let user_id = self.authenticate(token).await?;
        self.catalog
            .validate(product_id)
            .map_err(|_| ReconcileError::UnknownProduct(product_id.clone()))?;
        Ok(self.ledger.get_quantity(user_id, product_id).await?)
    }

    /// Returns the caller's stored premium flag.
    pub async fn premium_status(&self, token: Option<&str>) -> Result<bool> {
        let user_id = self.authenticate(token).await?;
        Ok(self.projector.is_premium(user_id).await?)
    }

    async fn authenticate(&self, token: Option<&str>) -> Result<UserId> {
        self.sessions
            .caller(token)
            .await
            .user_id()
            .map_err(|_| ReconcileError::NotAuthenticated)
    }
}

/// Maps the last error of a retried step. Retryable errors that survive the
/// retry loop mean the budget ran out.
fn retry_failure<E>(err: E) -> ReconcileError
where
    E: crate::Retryable + std::fmt::Display + Into<ReconcileError>,
{
    if err.is_retryable() {
        ReconcileError::exhausted(err)
    } else {
        err.into()
    }
}

#[async_trait]
impl<S> ReconcileBackend for Reconciler<S>
where
    S: EntitlementStore + UserStore + Clone,
{
    async fn reconcile_purchase(
        &self,
        token: Option<&str>,
        assertion: PurchaseAssertion,
    ) -> Result<ReconcileResponse> {
        Reconciler::reconcile_purchase(self, token, assertion).await
    }
}
