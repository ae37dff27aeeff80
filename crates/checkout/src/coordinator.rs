//! Checkout coordinator: turns a cart snapshot into a placed order.

use std::time::Instant;

use common::CustomerId;
use domain::{CartLine, CartSnapshot, Money, Order, OrderStatus};
use store::{NewOrder, NewOrderItem, ReserveOutcome, Store, StoreTx};

use crate::error::{CheckoutError, Result};

/// Places orders against a [`Store`].
///
/// Each checkout is one store transaction: lock the cart's products in
/// ascending id order, verify stock, price the lines from the locked view,
/// insert the order and its lines, decrement stock, commit. Any failure rolls
/// the transaction back and leaves the cart untouched.
pub struct CheckoutCoordinator<S: Store> {
    store: S,
}

impl<S: Store> CheckoutCoordinator<S> {
    /// Creates a new checkout coordinator.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Gets a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order for everything in `cart`.
    ///
    /// The cart is cleared only after the order has been committed.
    #[tracing::instrument(skip_all, fields(customer_id = %customer_id, lines = cart.len()))]
    pub async fn checkout(&self, customer_id: CustomerId, cart: &mut CartSnapshot) -> Result<Order> {
        let start = Self::started();
        let result = self.place_order(customer_id, cart).await;
        Self::finished(start, &result);
        if result.is_ok() {
            cart.clear();
        }
        result
    }

    /// Places an order for the customer's saved cart.
    ///
    /// The saved cart is removed in the same transaction that places the
    /// order, so it is consumed by at most one checkout. A failed checkout
    /// leaves it in place.
    #[tracing::instrument(skip_all, fields(customer_id = %customer_id))]
    pub async fn checkout_saved_cart(&self, customer_id: CustomerId) -> Result<Order> {
        let start = Self::started();
        let result = self.place_saved_order(customer_id).await;
        Self::finished(start, &result);
        result
    }

    fn started() -> Instant {
        metrics::counter!("checkout_attempts_total").increment(1);
        Instant::now()
    }

    fn finished(start: Instant, result: &Result<Order>) {
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total, "checkout committed");
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.reason()).increment(1);
                tracing::debug!(error = %e, "checkout aborted");
            }
        }
    }

    async fn place_order(&self, customer_id: CustomerId, cart: &CartSnapshot) -> Result<Order> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut tx = self.store.begin().await?;
        let result = reserve_and_record(&mut tx, customer_id, &cart.locking_order()).await;
        settle(tx, result).await
    }

    async fn place_saved_order(&self, customer_id: CustomerId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let result = take_and_record(&mut tx, customer_id).await;
        settle(tx, result).await
    }
}

/// Commits on success, rolls back otherwise.
async fn settle<T: StoreTx>(tx: T, result: Result<Order>) -> Result<Order> {
    match result {
        Ok(order) => {
            tx.commit().await?;
            Ok(order)
        }
        Err(e) => {
            rollback_quietly(tx).await;
            Err(e)
        }
    }
}

async fn take_and_record<T: StoreTx>(tx: &mut T, customer_id: CustomerId) -> Result<Order> {
    let cart = tx.take_saved_cart(customer_id).await?.unwrap_or_default();
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    reserve_and_record(tx, customer_id, &cart.locking_order()).await
}

async fn reserve_and_record<T: StoreTx>(
    tx: &mut T,
    customer_id: CustomerId,
    lines: &[CartLine],
) -> Result<Order> {
    // Lock and verify every product before writing anything.
    let mut priced: Vec<(CartLine, Money)> = Vec::with_capacity(lines.len());
    for line in lines {
        let product = tx
            .lock_product(line.product_id)
            .await?
            .ok_or(CheckoutError::InsufficientStock(line.product_id))?;
        if !product.has_stock_for(line.quantity) {
            tracing::debug!(
                product_id = %product.id,
                requested = line.quantity,
                available = product.quantity,
                "insufficient stock"
            );
            return Err(CheckoutError::InsufficientStock(product.id));
        }
        priced.push((*line, product.price));
    }

    let mut total = Money::zero();
    for (line, price) in &priced {
        total = price
            .checked_multiply(line.quantity)
            .and_then(|line_total| total.checked_add(line_total))
            .ok_or(CheckoutError::TotalOverflow)?;
    }

    let mut order = tx
        .insert_order(NewOrder {
            customer_id,
            total,
            status: OrderStatus::Pending,
        })
        .await?;

    for (line, unit_price) in &priced {
        let item = tx
            .insert_order_item(NewOrderItem {
                order_id: order.id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: *unit_price,
            })
            .await?;
        order.items.push(item);
    }

    for (line, _) in &priced {
        match tx.try_reserve(line.product_id, line.quantity).await? {
            ReserveOutcome::Reserved { .. } => {}
            ReserveOutcome::Insufficient { .. } => {
                return Err(CheckoutError::InsufficientStock(line.product_id));
            }
        }
    }

    Ok(order)
}

/// Rolls a transaction back, logging instead of failing if that errors too.
pub(crate) async fn rollback_quietly<T: StoreTx>(tx: T) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "transaction rollback failed");
    }
}
