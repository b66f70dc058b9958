//! Client-observed purchase state machine.

use serde::{Deserialize, Serialize};

/// The state of a purchase as the client sees it.
///
/// State transitions:
/// ```text
/// Idle ──► Purchasing ──┬──► Succeeded ──► Reconciling ──┬──► Granted
///                       │                      ▲         └──► ReconcileFailed
///                       │                      └──────────────────┘ (retryable)
///                       ├──► UserCancelled
///                       └──► PurchaseFailed
/// ```
///
/// Terminal states may start a new purchase. A non-retryable
/// `ReconcileFailed` is terminal: the transaction was rejected and will not
/// be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PurchaseState {
    #[default]
    Idle,

    /// The vendor purchase sheet is open.
    Purchasing,

    /// The vendor reported success; not yet granted.
    Succeeded,

    /// Waiting for the server to grant.
    Reconciling,

    /// The entitlement is in the ledger (terminal).
    Granted,

    /// The server could not grant. Retry with the same transaction when
    /// `retryable`; otherwise terminal.
    ReconcileFailed { retryable: bool },

    /// The user dismissed the purchase (terminal, not an error).
    UserCancelled,

    /// The vendor purchase failed (terminal).
    PurchaseFailed,
}

impl PurchaseState {
    /// Returns true if the flow may move from this state to `next`.
    pub fn can_transition_to(&self, next: PurchaseState) -> bool {
        use PurchaseState::*;
        if next == Purchasing {
            return *self == Idle || self.is_terminal();
        }
        matches!(
            (self, next),
            (Purchasing, Succeeded | UserCancelled | PurchaseFailed)
                | (Succeeded | ReconcileFailed { retryable: true }, Reconciling)
                | (Reconciling, Granted | ReconcileFailed { .. })
        )
    }

    /// Returns true if a new purchase can start.
    pub fn can_purchase(&self) -> bool {
        self.can_transition_to(PurchaseState::Purchasing)
    }

    /// Returns true if reconciliation can be retried without purchasing again.
    pub fn can_retry_reconcile(&self) -> bool {
        matches!(self, PurchaseState::ReconcileFailed { retryable: true })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseState::Granted
                | PurchaseState::UserCancelled
                | PurchaseState::PurchaseFailed
                | PurchaseState::ReconcileFailed { retryable: false }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseState::Idle => "Idle",
            PurchaseState::Purchasing => "Purchasing",
            PurchaseState::Succeeded => "Succeeded",
            PurchaseState::Reconciling => "Reconciling",
            PurchaseState::Granted => "Granted",
            PurchaseState::ReconcileFailed { .. } => "ReconcileFailed",
            PurchaseState::UserCancelled => "UserCancelled",
            PurchaseState::PurchaseFailed => "PurchaseFailed",
        }
    }
}

impl std::fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
