//! Health and Prometheus endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use ledger::{EntitlementStore, UserStore};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub products: usize,
    pub receipt_verification: &'static str,
}

/// GET /health
pub async fn health<S>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    Json(HealthResponse {
        status: "ok",
        products: state.reconciler.catalog().len(),
        receipt_verification: state.verification.as_str(),
    })
}

/// GET /metrics, in the Prometheus text exposition format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
