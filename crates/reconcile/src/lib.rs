//! Purchase-to-entitlement reconciliation.
//!
//! [`Reconciler`] is the authenticated server-side entry point: it checks the
//! caller, the product and the receipt, grants through the ledger and
//! reprojects premium status before reporting success. [`PurchaseFlow`] is the
//! client side of the same exchange, driving the [`PurchaseState`] machine
//! from the vendor purchase through reconciliation.

pub mod auth;
pub mod error;
pub mod flow;
pub mod orchestrator;
pub mod retry;
pub mod state;

pub use auth::{InMemorySessions, SessionResolver};
pub use common::{ProductId, TransactionId, UserId};
pub use error::{FlowError, ReconcileError, Result};
pub use flow::{PurchaseFlow, ResumeSummary, UserNotice};
pub use orchestrator::{
    PurchaseAssertion, ReconcileBackend, ReconcileResponse, Reconciler, ReconcilerConfig,
};
pub use retry::{RetryPolicy, Retryable};
pub use state::PurchaseState;
