//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, LifecycleError};
use domain::CartError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout failed.
    Checkout(CheckoutError),
    /// Order status change failed.
    Lifecycle(LifecycleError),
    /// Cart edit rejected.
    Cart(CartError),
    /// Store failure outside a checkout or lifecycle operation.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Lifecycle(err) => lifecycle_error_to_response(err),
            ApiError::Cart(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::Store(err) => store_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::EmptyCart | CheckoutError::TotalOverflow => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CheckoutError::InsufficientStock(_) => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::TransientFailure(e) => store_error_to_response(e),
    }
}

fn lifecycle_error_to_response(err: LifecycleError) -> (StatusCode, String) {
    match err {
        LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        LifecycleError::NotOwner { .. } | LifecycleError::NotAuthorized { .. } => {
            (StatusCode::FORBIDDEN, err.to_string())
        }
        LifecycleError::InvalidTransition(_) => (StatusCode::CONFLICT, err.to_string()),
        LifecycleError::TransientFailure(e) => store_error_to_response(e),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::ProductNotFound(_) | StoreError::OrderNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        _ if err.is_retryable() => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
