use thiserror::Error;

use crate::ProductId;

/// Errors raised while loading or querying the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The product identifier is not part of the catalog.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// Two catalog entries share the same identifier.
    #[error("Duplicate product in catalog: {0}")]
    DuplicateProduct(ProductId),

    /// A catalog entry has a negative price.
    #[error("Invalid price for product {0}")]
    InvalidPrice(ProductId),

    /// The catalog file could not be read.
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog file is not valid JSON.
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
