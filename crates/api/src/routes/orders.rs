//! Checkout, order lifecycle and order listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::{CustomerSummary, Reversal, SellerSummary};
use common::{CustomerId, OrderId, OrderItemId, ProductId, SellerId};
use domain::{CartSnapshot, Order, OrderItem};
use serde::{Deserialize, Serialize};
use store::Store;

use super::LineBody;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: CustomerId,
    /// Lines to buy; when absent the customer's saved cart is checked out.
    pub items: Option<Vec<LineBody>>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerActionRequest {
    pub customer_id: CustomerId,
}

#[derive(Debug, Deserialize)]
pub struct SellerActionRequest {
    pub seller_id: SellerId,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: String,
    pub total_cents: i64,
    pub placed_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct ReversalResponse {
    pub order_id: OrderId,
    pub outcome: String,
    pub restored: Vec<LineBody>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            status: order.status.to_string(),
            total_cents: order.total.cents(),
            placed_at: order.placed_at,
            items: order.items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Reversal> for ReversalResponse {
    fn from(reversal: Reversal) -> Self {
        Self {
            order_id: reversal.order_id,
            outcome: reversal.outcome.to_string(),
            restored: reversal
                .restored
                .iter()
                .map(|item| LineBody {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

fn to_responses(orders: Vec<Order>) -> Vec<OrderResponse> {
    orders.into_iter().map(Into::into).collect()
}

// -- Handlers --

/// POST /checkout: place an order for the given lines or the saved cart.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = match req.items {
        Some(items) => {
            let mut cart =
                CartSnapshot::from_lines(items.into_iter().map(|l| (l.product_id, l.quantity)))?;
            state.checkout.checkout(req.customer_id, &mut cart).await?
        }
        None => state.checkout.checkout_saved_cart(req.customer_id).await?,
    };

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: load an order with its lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.lifecycle.get_order(OrderId::new(id)).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel: the customer withdraws a pending order.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
    Json(req): Json<CustomerActionRequest>,
) -> Result<Json<ReversalResponse>, ApiError> {
    let reversal = state
        .lifecycle
        .cancel(OrderId::new(id), req.customer_id)
        .await?;
    Ok(Json(reversal.into()))
}

/// POST /orders/{id}/reject: a seller refuses a pending order.
#[tracing::instrument(skip(state, req))]
pub async fn reject<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
    Json(req): Json<SellerActionRequest>,
) -> Result<Json<ReversalResponse>, ApiError> {
    let reversal = state
        .lifecycle
        .reject(OrderId::new(id), req.seller_id)
        .await?;
    Ok(Json(reversal.into()))
}

/// POST /orders/{id}/deliver: a seller marks a pending order delivered.
#[tracing::instrument(skip(state, req))]
pub async fn deliver<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
    Json(req): Json<SellerActionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .lifecycle
        .mark_delivered(OrderId::new(id), req.seller_id)
        .await?;
    Ok(Json(order.into()))
}

/// GET /customers/{id}/orders
#[tracing::instrument(skip(state))]
pub async fn for_customer<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .lifecycle
        .orders_for_customer(CustomerId::new(id))
        .await?;
    Ok(Json(to_responses(orders)))
}

/// GET /customers/{id}/summary
#[tracing::instrument(skip(state))]
pub async fn customer_summary<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<CustomerSummary>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .customer_summary(CustomerId::new(id))
            .await?,
    ))
}

/// GET /sellers/{id}/orders
#[tracing::instrument(skip(state))]
pub async fn for_seller<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .lifecycle
        .orders_for_seller(SellerId::new(id))
        .await?;
    Ok(Json(to_responses(orders)))
}

/// GET /sellers/{id}/summary
#[tracing::instrument(skip(state))]
pub async fn seller_summary<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<SellerSummary>, ApiError> {
    Ok(Json(state.lifecycle.seller_summary(SellerId::new(id)).await?))
}
