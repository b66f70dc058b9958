//! Derived user state.
//!
//! The only projection today is the premium flag: a user is premium iff they
//! own at least one unit of a product marked `is_premium_grant` in the
//! catalog. [`PremiumProjector`] is the single place that recomputes it.

pub mod error;
pub mod premium;

pub use error::{ProjectionError, Result};
pub use premium::{PremiumProjector, RebuildSummary};
