//! Client-side purchase flow.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use billing::{BillingClient, PurchaseOutcome, StoreTransaction};

use crate::{
    FlowError, ProductId, PurchaseAssertion, PurchaseState, ReconcileBackend, ReconcileError,
    ReconcileResponse, TransactionId,
};

/// Message to show the user after a failed step.
///
/// A cancelled purchase produces no notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserNotice {
    /// The store purchase did not go through.
    PurchaseFailed { reason: String },
    /// Paid, but not yet delivered. The user can retry without paying again.
    DeliveryPending { reason: String },
    /// The purchase was rejected by the server.
    DeliveryRejected { reason: String },
}

impl UserNotice {
    /// Returns true if the user should be offered a retry button.
    pub fn offers_retry(&self) -> bool {
        !matches!(self, UserNotice::DeliveryRejected { .. })
    }
}

/// Outcome of [`PurchaseFlow::resume`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeSummary {
    /// Responses for transactions reconciled during the resume.
    pub reconciled: Vec<ReconcileResponse>,
    /// Transactions that still could not be reconciled.
    pub failed: Vec<TransactionId>,
}

/// Drives one user's purchases through the [`PurchaseState`] machine.
///
/// The vendor purchase is the only long wait and is never repeated on a
/// reconcile retry; retries reuse the stored transaction.
pub struct PurchaseFlow {
    billing: Arc<BillingClient>,
    backend: Arc<dyn ReconcileBackend>,
    session_token: String,
    state: PurchaseState,
    pending: Option<StoreTransaction>,
    acknowledged: HashSet<TransactionId>,
    notice: Option<UserNotice>,
}

impl PurchaseFlow {
    pub fn new(
        billing: Arc<BillingClient>,
        backend: Arc<dyn ReconcileBackend>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            billing,
            backend,
            session_token: session_token.into(),
            state: PurchaseState::Idle,
            pending: None,
            acknowledged: HashSet::new(),
            notice: None,
        }
    }

    pub fn state(&self) -> PurchaseState {
        self.state
    }

    /// The notice for the most recent failure, if any.
    pub fn notice(&self) -> Option<&UserNotice> {
        self.notice.as_ref()
    }

    /// The purchased transaction still waiting to be granted.
    pub fn pending_transaction(&self) -> Option<&StoreTransaction> {
        self.pending.as_ref()
    }

    fn transition(&mut self, next: PurchaseState) {
        tracing::debug!(from = %self.state, to = %next, "purchase state");
        self.state = next;
    }

    /// Purchases a product and reconciles it.
    pub async fn purchase(&mut self, product_id: &ProductId) -> Result<PurchaseState, FlowError> {
        self.purchase_cancellable(product_id, std::future::pending())
            .await
    }

    /// Like [`purchase`](Self::purchase), but abandons the vendor purchase if
    /// `cancel` resolves first.
    #[tracing::instrument(skip(self, product_id, cancel), fields(product_id = %product_id))]
    pub async fn purchase_cancellable<F>(
        &mut self,
        product_id: &ProductId,
        cancel: F,
    ) -> Result<PurchaseState, FlowError>
    where
        F: Future<Output = ()>,
    {
        if !self.state.can_purchase() {
            return Err(FlowError::InvalidState {
                expected: "Idle or a terminal state",
                actual: self.state,
            });
        }

        self.notice = None;
        self.transition(PurchaseState::Purchasing);

        match self.billing.purchase_cancellable(product_id, cancel).await {
            PurchaseOutcome::Succeeded(transaction) => {
                self.transition(PurchaseState::Succeeded);
                self.pending = Some(transaction);
                Ok(self.reconcile_pending().await)
            }
            PurchaseOutcome::UserCancelled => {
                self.transition(PurchaseState::UserCancelled);
                Ok(self.state)
            }
            PurchaseOutcome::Failed(reason) => {
                self.notice = Some(UserNotice::PurchaseFailed { reason });
                self.transition(PurchaseState::PurchaseFailed);
                Ok(self.state)
            }
        }
    }

    /// Retries reconciliation of the pending transaction without purchasing
    /// again.
    pub async fn retry_reconcile(&mut self) -> Result<PurchaseState, FlowError> {
        if !self.state.can_retry_reconcile() || self.pending.is_none() {
            return Err(FlowError::InvalidState {
                expected: "ReconcileFailed (retryable)",
                actual: self.state,
            });
        }
        Ok(self.reconcile_pending().await)
    }

    async fn reconcile_pending(&mut self) -> PurchaseState {
        let Some(transaction) = self.pending.clone() else {
            return self.state;
        };

        self.transition(PurchaseState::Reconciling);
        match self.reconcile(&transaction).await {
            Ok(_) => {
                self.pending = None;
                self.notice = None;
                self.transition(PurchaseState::Granted);
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let reason = e.to_string();
                if retryable {
                    self.notice = Some(UserNotice::DeliveryPending { reason });
                } else {
                    // A rejected transaction is never retried.
                    self.pending = None;
                    self.notice = Some(UserNotice::DeliveryRejected { reason });
                }
                self.transition(PurchaseState::ReconcileFailed { retryable });
            }
        }
        self.state
    }

    async fn reconcile(
        &mut self,
        transaction: &StoreTransaction,
    ) -> Result<ReconcileResponse, ReconcileError> {
        let assertion = PurchaseAssertion::new(transaction.product_id.clone())
            .with_transaction(transaction.transaction_id.clone());

        let response = self
            .backend
            .reconcile_purchase(Some(&self.session_token), assertion)
            .await?;
        self.acknowledged.insert(transaction.transaction_id.clone());
        Ok(response)
    }

    /// Reconciles vendor transactions this client never saw granted, such as
    /// a purchase that completed after the app was killed.
    ///
    /// Already-granted transactions are recognized by the server as
    /// duplicates, so resuming more than once is harmless.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&mut self) -> Result<ResumeSummary, FlowError> {
        let snapshot = self.billing.get_customer_info().await?;
        let mut summary = ResumeSummary::default();

        for transaction in snapshot.transactions {
            if self.acknowledged.contains(&transaction.transaction_id) {
                continue;
            }
            match self.reconcile(&transaction).await {
                Ok(response) => {
                    if self
                        .pending
                        .as_ref()
                        .is_some_and(|p| p.transaction_id == transaction.transaction_id)
                    {
                        self.pending = None;
                        self.notice = None;
                        self.transition(PurchaseState::Reconciling);
                        self.transition(PurchaseState::Granted);
                    }
                    summary.reconciled.push(response);
                }
                Err(e) => {
                    tracing::warn!(
                        transaction_id = %transaction.transaction_id,
                        error = %e,
                        "could not reconcile on resume"
                    );
                    summary.failed.push(transaction.transaction_id);
                }
            }
        }

        tracing::info!(
            reconciled = summary.reconciled.len(),
            failed = summary.failed.len(),
            "resume complete"
        );
        Ok(summary)
    }
}
