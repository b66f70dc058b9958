//! Identifiers shared by every crate in the workspace.

pub mod types;

pub use types::{ProductId, TransactionId, UserId};
