pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{ProductId, TransactionId, UserId};
pub use error::{LedgerError, Result};
pub use ledger::EntitlementLedger;
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use record::{
    Caller, EntitlementRecord, GrantOutcome, GrantRequest, PremiumProjection, ProcessedTransaction,
};
pub use store::{EntitlementStore, EntitlementStoreExt, UserStore, UserStream};
