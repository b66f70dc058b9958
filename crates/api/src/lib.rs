//! HTTP API for purchase reconciliation.
//!
//! Exposes the reconcile entry point and the caller's entitlement reads over
//! REST, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use billing::{
    BillingInitError, BillingVendor, DisabledVerifier, ReceiptVerifier, TrustingVerifier,
    VendorReceiptVerifier,
};
use catalog::ProductCatalog;
use ledger::{EntitlementStore, UserStore};
use metrics_exporter_prometheus::PrometheusHandle;
use reconcile::{InMemorySessions, Reconciler};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{Config, VerificationMode};
use state::{AppState, VerificationStatus};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S>))
        .route("/products", get(routes::products::list::<S>))
        .route(
            "/purchases/reconcile",
            post(routes::purchases::reconcile::<S>),
        )
        .route("/entitlements", get(routes::entitlements::list::<S>))
        .route(
            "/entitlements/{product_id}",
            get(routes::entitlements::quantity::<S>),
        )
        .route("/users/me/premium", get(routes::entitlements::premium::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the reconciler over `store` with in-memory sessions.
///
/// `vendor` is the billing vendor's server API used to look up receipts.
/// With `RECEIPT_VERIFICATION=vendor`, a missing vendor or API key does not
/// stop startup; every reconcile then fails as retryable until the server is
/// reconfigured, so clients keep the purchase and retry later.
pub fn create_default_state<S>(
    store: S,
    catalog: ProductCatalog,
    config: &Config,
    vendor: Option<Arc<dyn BillingVendor>>,
) -> Arc<AppState<S>>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    let sessions = InMemorySessions::new();
    let (verification, verifier) = receipt_verifier(config, vendor);

    let reconciler = Reconciler::new(
        store,
        Arc::new(catalog),
        Arc::new(sessions.clone()),
        verifier,
        config.reconciler_config(),
    );

    Arc::new(AppState {
        reconciler,
        sessions,
        verification,
    })
}

fn receipt_verifier(
    config: &Config,
    vendor: Option<Arc<dyn BillingVendor>>,
) -> (VerificationStatus, Arc<dyn ReceiptVerifier>) {
    match (config.receipt_verification, vendor, &config.billing_api_key) {
        (VerificationMode::Trust, _, _) => {
            tracing::warn!("receipt verification disabled, client purchase claims are trusted");
            (VerificationStatus::Trust, Arc::new(TrustingVerifier) as _)
        }
        (VerificationMode::Vendor, Some(vendor), Some(_)) => (
            VerificationStatus::Vendor,
            Arc::new(VendorReceiptVerifier::new(vendor)) as _,
        ),
        (VerificationMode::Vendor, _, None) => {
            let reason = BillingInitError::MissingApiKey.to_string();
            tracing::warn!(error = %reason, "billing disabled, purchases cannot be verified");
            (
                VerificationStatus::Disabled,
                Arc::new(DisabledVerifier::new(reason)) as _,
            )
        }
        (VerificationMode::Vendor, None, Some(_)) => {
            let reason = "no billing vendor configured";
            tracing::warn!(error = reason, "billing disabled, purchases cannot be verified");
            (
                VerificationStatus::Disabled,
                Arc::new(DisabledVerifier::new(reason)) as _,
            )
        }
    }
}
