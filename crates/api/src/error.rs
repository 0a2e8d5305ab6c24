//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use serde_json::{Value, json};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"success": false, "error": "...", "details"?: ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request: bad path parameter, unreadable body or query.
    #[error("{0}")]
    BadRequest(String),

    /// Domain rule or lookup failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Checkout failure.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl ApiError {
    fn status_and_details(&self) -> (StatusCode, Option<Value>) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            ApiError::Domain(err) => domain_error_parts(err),
            ApiError::Checkout(CheckoutError::Domain(err)) => domain_error_parts(err),
            ApiError::Checkout(CheckoutError::CompensationFailed { checkout_id, .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(json!({ "checkout_id": checkout_id })),
            ),
            ApiError::Checkout(CheckoutError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details) = self.status_and_details();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let mut body = json!({ "success": false, "error": message });
        if let Some(details) = details {
            body["details"] = details;
        }
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_parts(err: &DomainError) -> (StatusCode, Option<Value>) {
    match err {
        DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, None),
        DomainError::ValidationFailed(problems) => {
            (StatusCode::BAD_REQUEST, Some(json!(problems)))
        }
        DomainError::InsufficientInventory {
            product_id,
            variant_id,
            requested,
            available,
            ..
        } => (
            StatusCode::BAD_REQUEST,
            Some(json!({
                "product_id": product_id,
                "variant_id": variant_id,
                "requested": requested,
                "available": available,
            })),
        ),
        DomainError::PromoRejected { code, .. } => {
            (StatusCode::BAD_REQUEST, Some(json!({ "code": code })))
        }
        DomainError::EmptyCart | DomainError::InvalidStatus(_) => (StatusCode::BAD_REQUEST, None),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, None),
        DomainError::Store(_) | DomainError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, None)
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
