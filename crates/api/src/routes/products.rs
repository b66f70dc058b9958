//! Catalog listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use catalog::Product;
use ledger::{EntitlementStore, UserStore};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub title: String,
    pub price_cents: i64,
    /// Display price, e.g. `$1.99`.
    pub price: String,
    pub description: String,
    pub is_premium_grant: bool,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            title: product.title.clone(),
            price_cents: product.price.cents(),
            price: product.price.to_string(),
            description: product.description.clone(),
            is_premium_grant: product.is_premium_grant,
        }
    }
}

/// GET /products
pub async fn list<S>(State(state): State<Arc<AppState<S>>>) -> Json<Vec<ProductResponse>>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    let products = state
        .reconciler
        .catalog()
        .products()
        .map(ProductResponse::from)
        .collect();
    Json(products)
}
