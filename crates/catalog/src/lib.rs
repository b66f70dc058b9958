//! Read-only product catalog.
//!
//! Products are defined at deploy time, either from the built-in defaults or
//! from a JSON file, and never change while the process runs.

pub mod error;
pub mod money;
pub mod product;

pub use common::ProductId;
pub use error::{CatalogError, Result};
pub use money::Money;
pub use product::{Product, ProductCatalog};
