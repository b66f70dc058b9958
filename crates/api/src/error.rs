//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reconcile::ReconcileError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Reconciliation or entitlement lookup failed.
    Reconcile(ReconcileError),
}

impl ApiError {
    /// Status code, message and whether the client may retry the same request.
    fn parts(&self) -> (StatusCode, String, bool) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), false),
            ApiError::Reconcile(err) => (reconcile_status(err), err.to_string(), err.is_retryable()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = self.parts();
        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string()).increment(1);

        if status.is_server_error() {
            tracing::error!(error = %message, %status, retryable, "request failed");
        } else {
            tracing::debug!(error = %message, %status, "request rejected");
        }

        let body = serde_json::json!({ "error": message, "retryable": retryable });
        (status, axum::Json(body)).into_response()
    }
}

fn reconcile_status(err: &ReconcileError) -> StatusCode {
    match err {
        ReconcileError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        ReconcileError::UnknownProduct(_) | ReconcileError::InvalidIncrement(_) => {
            StatusCode::BAD_REQUEST
        }
        ReconcileError::ReceiptInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReconcileError::TransactionReused { .. } => StatusCode::CONFLICT,
        ReconcileError::ReconcileFailed { retryable: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
        ReconcileError::ReconcileFailed { retryable: false, .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Reconcile(err)
    }
}
