use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, ProductId, Result, TransactionId, UserId};

/// Identity attached to a ledger call.
///
/// Grants are only accepted from an authenticated user; everything else is
/// rejected before the store is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// No valid session was attached to the request.
    Anonymous,
    /// The request carries a resolved user session.
    User(UserId),
}

impl Caller {
    /// Returns the authenticated user, or `NotAuthenticated`.
    pub fn user_id(&self) -> Result<UserId> {
        match self {
            Caller::User(id) => Ok(*id),
            Caller::Anonymous => Err(LedgerError::NotAuthenticated),
        }
    }
}

impl From<Option<UserId>> for Caller {
    fn from(user: Option<UserId>) -> Self {
        user.map_or(Caller::Anonymous, Caller::User)
    }
}

/// Accumulated quantity of a product owned by a user.
///
/// Absence of a record is equivalent to a quantity of zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A request to increase a user's quantity of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub increment_by: u32,
    /// Vendor transaction identifier. When present, a repeated request with
    /// the same key for the same user is a no-op.
    pub dedupe_key: Option<TransactionId>,
}

impl GrantRequest {
    /// Creates a request granting one unit with no dedupe key.
    pub fn new(user_id: UserId, product_id: impl Into<ProductId>) -> Self {
        Self {
            user_id,
            product_id: product_id.into(),
            increment_by: 1,
            dedupe_key: None,
        }
    }

    pub fn increment_by(mut self, increment_by: u32) -> Self {
        self.increment_by = increment_by;
        self
    }

    pub fn dedupe_key(mut self, key: impl Into<TransactionId>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    /// Checks the request before it reaches a store.
    pub fn validate(&self) -> Result<()> {
        if self.increment_by == 0 {
            return Err(LedgerError::InvalidIncrement(self.increment_by));
        }
        Ok(())
    }
}

/// Result of a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantOutcome {
    /// The record after the grant (or the current record for a duplicate).
    pub record: EntitlementRecord,
    /// True if the dedupe key had already been applied and nothing changed.
    pub duplicate: bool,
}

/// A vendor transaction that has been applied to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub product_id: ProductId,
    pub increment: u32,
    pub granted_at: DateTime<Utc>,
}

/// Result of recomputing a user's premium flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PremiumProjection {
    pub is_premium: bool,
    /// True if the stored flag was different and has been overwritten.
    pub changed: bool,
}
