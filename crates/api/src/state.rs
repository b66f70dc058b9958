//! Shared application state.

use ledger::{EntitlementStore, UserStore};
use reconcile::{InMemorySessions, Reconciler};

/// State shared by all handlers.
pub struct AppState<S>
where
    S: EntitlementStore + UserStore + Clone,
{
    pub reconciler: Reconciler<S>,
    /// Session table the reconciler resolves bearer tokens against.
    pub sessions: InMemorySessions,
    pub verification: VerificationStatus,
}

/// How receipts are being verified, as reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Vendor,
    Trust,
    /// Vendor verification was requested but no vendor or API key is
    /// configured.
    Disabled,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Vendor => "vendor",
            VerificationStatus::Trust => "trust",
            VerificationStatus::Disabled => "disabled",
        }
    }
}
