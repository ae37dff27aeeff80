//! Saved cart endpoints.
//!
//! A saved cart is a verbatim copy of the customer's cart lines. It is only
//! read back by `POST /checkout` without explicit items.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CustomerId;
use domain::CartSnapshot;
use store::Store;

use super::LineBody;
use crate::AppState;
use crate::error::ApiError;

fn to_body(cart: &CartSnapshot) -> Vec<LineBody> {
    cart.lines()
        .iter()
        .map(|line| LineBody {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect()
}

/// PUT /customers/{id}/cart: replace the customer's saved cart.
///
/// Repeated products are merged into one line.
#[tracing::instrument(skip(state, lines))]
pub async fn save<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
    Json(lines): Json<Vec<LineBody>>,
) -> Result<Json<Vec<LineBody>>, ApiError> {
    let cart = CartSnapshot::from_lines(lines.into_iter().map(|l| (l.product_id, l.quantity)))?;
    state.store.save_cart(CustomerId::new(id), &cart).await?;
    Ok(Json(to_body(&cart)))
}

/// GET /customers/{id}/cart
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<LineBody>>, ApiError> {
    let cart = state
        .store
        .load_cart(CustomerId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No saved cart for customer {id}")))?;
    Ok(Json(to_body(&cart)))
}

/// DELETE /customers/{id}/cart
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_saved_cart(CustomerId::new(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No saved cart for customer {id}")))
    }
}
