//! HTTP route handlers.

pub mod entitlements;
pub mod ops;
pub mod products;
pub mod purchases;
