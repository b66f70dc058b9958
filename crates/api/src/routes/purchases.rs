//! Purchase reconciliation endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use ledger::{EntitlementStore, UserStore};
use reconcile::{PurchaseAssertion, ReconcileResponse};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::BearerToken;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub product_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl ReconcileRequest {
    fn into_assertion(self) -> Result<PurchaseAssertion, ApiError> {
        if self.product_id.trim().is_empty() {
            return Err(ApiError::BadRequest("product_id must not be empty".into()));
        }
        let assertion = PurchaseAssertion::new(self.product_id);
        match self.transaction_id {
            None => Ok(assertion),
            Some(id) if id.trim().is_empty() => Err(ApiError::BadRequest(
                "transaction_id must not be empty".into(),
            )),
            Some(id) => Ok(assertion.with_transaction(id)),
        }
    }
}

/// POST /purchases/reconcile
///
/// Grants the product to the authenticated caller once the receipt checks
/// out. Safe to repeat with the same `transaction_id`.
#[tracing::instrument(skip(state, token, req), fields(product_id = %req.product_id))]
pub async fn reconcile<S>(
    State(state): State<Arc<AppState<S>>>,
    token: BearerToken,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, ApiError>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    let assertion = req.into_assertion()?;
    let response = state
        .reconciler
        .reconcile_purchase(token.as_deref(), assertion)
        .await?;
    Ok(Json(response))
}
