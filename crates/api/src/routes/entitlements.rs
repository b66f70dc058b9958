//! Entitlement and premium status reads for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use ledger::{EntitlementRecord, EntitlementStore, UserStore};
use reconcile::ProductId;
use serde::Serialize;

use crate::error::ApiError;
use crate::extract::BearerToken;
use crate::state::AppState;

#[derive(Serialize)]
pub struct EntitlementResponse {
    pub product_id: String,
    pub quantity: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EntitlementRecord> for EntitlementResponse {
    fn from(record: EntitlementRecord) -> Self {
        Self {
            product_id: record.product_id.to_string(),
            quantity: record.quantity,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct QuantityResponse {
    pub product_id: String,
    pub quantity: u64,
}

#[derive(Serialize)]
pub struct PremiumResponse {
    pub is_premium: bool,
}

/// GET /entitlements
#[tracing::instrument(skip(state, token))]
pub async fn list<S>(
    State(state): State<Arc<AppState<S>>>,
    token: BearerToken,
) -> Result<Json<Vec<EntitlementResponse>>, ApiError>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    let records = state.reconciler.entitlements(token.as_deref()).await?;
    Ok(Json(records.into_iter().map(EntitlementResponse::from).collect()))
}

/// GET /entitlements/{product_id}. An unowned product reads as 0.
#[tracing::instrument(skip(state, token))]
pub async fn quantity<S>(
    State(state): State<Arc<AppState<S>>>,
    token: BearerToken,
    Path(product_id): Path<String>,
) -> Result<Json<QuantityResponse>, ApiError>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    let product_id = ProductId::new(product_id);
    let quantity = state
        .reconciler
        .quantity(token.as_deref(), &product_id)
        .await?;
    Ok(Json(QuantityResponse {
        product_id: product_id.to_string(),
        quantity,
    }))
}

/// GET /users/me/premium
#[tracing::instrument(skip(state, token))]
pub async fn premium<S>(
    State(state): State<Arc<AppState<S>>>,
    token: BearerToken,
) -> Result<Json<PremiumResponse>, ApiError>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    let is_premium = state.reconciler.premium_status(token.as_deref()).await?;
    Ok(Json(PremiumResponse { is_premium }))
}
