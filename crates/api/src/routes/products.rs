//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ProductId, SellerId};
use domain::{Money, NewProduct, Product};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub seller_id: SellerId,
    pub name: String,
    pub price_cents: i64,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub price_cents: i64,
    pub quantity: u32,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            seller_id: product.seller_id,
            name: product.name,
            price_cents: product.price.cents(),
            quantity: product.quantity,
        }
    }
}

/// POST /products: list a new product with its initial stock.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Product name must not be empty".into()));
    }
    if req.price_cents < 0 {
        return Err(ApiError::BadRequest(format!(
            "Invalid price: {} (must not be negative)",
            req.price_cents
        )));
    }

    let product = state
        .store
        .create_product(NewProduct::new(
            req.seller_id,
            req.name,
            Money::from_cents(req.price_cents),
            req.quantity,
        ))
        .await?;

    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /products/{id}: read a product's committed stock and price.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .store
        .get_product(ProductId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    Ok(Json(product.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriceRequest {
    pub price_cents: i64,
}

/// PUT /products/{id}/price: change the list price.
///
/// Orders already placed keep the price they were bought at.
#[tracing::instrument(skip(state, req))]
pub async fn update_price<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePriceRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    if req.price_cents < 0 {
        return Err(ApiError::BadRequest(format!(
            "Invalid price: {} (must not be negative)",
            req.price_cents
        )));
    }

    let product = state
        .store
        .update_product_price(ProductId::new(id), Money::from_cents(req.price_cents))
        .await?;

    Ok(Json(product.into()))
}
