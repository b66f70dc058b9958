use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CatalogError, Money, ProductId, Result};

/// A purchasable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price: Money,
    pub description: String,
    /// Owning at least one unit of this product makes the user premium.
    #[serde(default)]
    pub is_premium_grant: bool,
}

impl Product {
    /// Creates a regular (non-premium) product.
    pub fn new(
        id: impl Into<ProductId>,
        title: impl Into<String>,
        price: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price,
            description: description.into(),
            is_premium_grant: false,
        }
    }

    /// Marks the product as unlocking premium status.
    pub fn premium(mut self) -> Self {
        self.is_premium_grant = true;
        self
    }
}

/// Immutable mapping from product identifier to product.
///
/// There is no mutation path once a catalog has been built.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: BTreeMap<ProductId, Product>,
}

impl ProductCatalog {
    /// Builds a catalog, rejecting duplicate identifiers and negative prices.
    pub fn new(products: impl IntoIterator<Item = Product>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for product in products {
            if product.price.is_negative() {
                return Err(CatalogError::InvalidPrice(product.id));
            }
            if map.contains_key(&product.id) {
                return Err(CatalogError::DuplicateProduct(product.id));
            }
            map.insert(product.id.clone(), product);
        }
        Ok(Self { products: map })
    }

    /// Parses a catalog from a JSON array of products.
    pub fn from_json(json: &str) -> Result<Self> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        Self::new(products)
    }

    /// Loads a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// The catalog shipped with the application.
    pub fn builtin() -> Self {
        let products = vec![
            Product::new(
                "batman_badge",
                "Batman Badge",
                Money::from_cents(199),
                "Show off the bat signal on your profile",
            ),
            Product::new(
                "superman_badge",
                "Superman Badge",
                Money::from_cents(199),
                "Up, up and away on your profile",
            ),
            Product::new(
                "gold_frame",
                "Gold Avatar Frame",
                Money::from_cents(299),
                "A golden frame around your avatar",
            ),
            Product::new(
                "premium_monthly",
                "Premium (1 month)",
                Money::from_cents(499),
                "Unlock premium features for a month",
            )
            .premium(),
            Product::new(
                "premium_lifetime",
                "Premium (lifetime)",
                Money::from_cents(4999),
                "Unlock premium features forever",
            )
            .premium(),
        ];

        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Looks up a product.
    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.products.get(id)
    }

    /// Looks up a product, failing with `UnknownProduct` when absent.
    pub fn validate(&self, id: &ProductId) -> Result<&Product> {
        self.get(id)
            .ok_or_else(|| CatalogError::UnknownProduct(id.clone()))
    }

    /// Returns true if the product unlocks premium status.
    pub fn is_premium_grant(&self, id: &ProductId) -> bool {
        self.get(id).is_some_and(|p| p.is_premium_grant)
    }

    /// Identifiers of every premium-class product.
    pub fn premium_product_ids(&self) -> Vec<ProductId> {
        self.products
            .values()
            .filter(|p| p.is_premium_grant)
            .map(|p| p.id.clone())
            .collect()
    }

    /// All products, ordered by identifier.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_contains_badges_and_premium() {
        let catalog = ProductCatalog::builtin();
        let badge = catalog.validate(&"batman_badge".into()).unwrap();
        assert_eq!(badge.price, Money::from_cents(199));
        assert!(!badge.is_premium_grant);
        assert!(catalog.is_premium_grant(&"premium_lifetime".into()));
        assert_eq!(catalog.premium_product_ids().len(), 2);
    }

    #[test]
    fn validate_unknown_product_fails() {
        let catalog = ProductCatalog::builtin();
        let result = catalog.validate(&"joker_badge".into());
        assert!(matches!(result, Err(CatalogError::UnknownProduct(id)) if id.as_str() == "joker_badge"));
    }

    #[test]
    fn unknown_product_is_not_premium() {
        let catalog = ProductCatalog::builtin();
        assert!(!catalog.is_premium_grant(&"nope".into()));
    }

    #[test]
    fn from_json_defaults_premium_flag_to_false() {
        let catalog = ProductCatalog::from_json(
            r#"[
                {"id": "sticker", "title": "Sticker", "price": 99, "description": "A sticker"},
                {"id": "vip", "title": "VIP", "price": 999, "description": "VIP", "is_premium_grant": true}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert!(!catalog.is_premium_grant(&"sticker".into()));
        assert!(catalog.is_premium_grant(&"vip".into()));
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let result = ProductCatalog::new(vec![
            Product::new("a", "A", Money::from_cents(1), "a"),
            Product::new("a", "A again", Money::from_cents(2), "a"),
        ]);
        assert!(matches!(result, Err(CatalogError::DuplicateProduct(_))));
    }

    #[test]
    fn negative_price_is_rejected() {
        let result = ProductCatalog::new(vec![Product::new("a", "A", Money::from_cents(-1), "a")]);
        assert!(matches!(result, Err(CatalogError::InvalidPrice(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = ProductCatalog::from_json("{not json");
        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }
}
