//! Checkout and lifecycle error types.

use common::{CustomerId, OrderId, ProductId, SellerId};
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while turning a cart into an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A product has fewer units than requested, or does not exist.
    #[error("Insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    /// The order total does not fit in the money representation.
    #[error("Order total is out of range")]
    TotalOverflow,

    /// The store failed; the transaction was rolled back.
    #[error("Checkout failed: {0}")]
    TransientFailure(#[from] StoreError),
}

impl CheckoutError {
    /// Returns true if retrying the whole checkout may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::TransientFailure(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Metric label for the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::InsufficientStock(_) => "insufficient_stock",
            CheckoutError::TotalOverflow => "total_overflow",
            CheckoutError::TransientFailure(e) if e.is_retryable() => "transient",
            CheckoutError::TransientFailure(_) => "storage",
        }
    }
}

/// Errors that can occur while changing the status of a placed order.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The order does not exist, or has already been reversed.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The acting customer did not place the order.
    #[error("Customer {customer_id} does not own order {order_id}")]
    NotOwner {
        order_id: OrderId,
        customer_id: CustomerId,
    },

    /// The acting seller owns none of the order's products.
    #[error("Seller {seller_id} is not authorized for order {order_id}")]
    NotAuthorized {
        order_id: OrderId,
        seller_id: SellerId,
    },

    /// The order's status does not allow the action.
    #[error(transparent)]
    InvalidTransition(#[from] OrderError),

    /// The store failed; the transaction was rolled back.
    #[error("Order update failed: {0}")]
    TransientFailure(#[from] StoreError),
}

impl LifecycleError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LifecycleError::TransientFailure(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
