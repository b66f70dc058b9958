//! Billing vendor boundary.
//!
//! The vendor SDK sits behind [`BillingVendor`]. [`BillingClient`] wraps it
//! for the purchase flow and normalizes every vendor failure, so nothing past
//! this crate sees a raw [`VendorError`]. [`ReceiptVerifier`] is the seam the
//! reconciler uses to check a client-asserted purchase before granting.

pub mod client;
pub mod error;
pub mod memory;
pub mod verifier;
pub mod vendor;

pub use client::{BillingClient, CustomerSnapshot, PurchaseOutcome};
pub use common::{ProductId, TransactionId, UserId};
pub use error::{BillingError, BillingInitError, Result, VendorError};
pub use memory::InMemoryVendor;
pub use vendor::{BillingVendor, CustomerInfo, StoreProduct, StoreTransaction};
pub use verifier::{
    DisabledVerifier, ReceiptSource, ReceiptVerifier, TrustingVerifier, VendorReceiptVerifier,
    VerificationError, VerifiedReceipt,
};
