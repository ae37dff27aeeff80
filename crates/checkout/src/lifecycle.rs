//! Order lifecycle: delivery and the reversal paths that restore stock.

use std::collections::HashSet;

use common::{CustomerId, OrderId, ProductId, SellerId};
use domain::{Order, OrderItem, OrderStatus};
use serde::Serialize;
use store::{OrderQuery, Store, StoreTx};

use crate::coordinator::rollback_quietly;
use crate::error::LifecycleError;
use crate::summary::{CustomerSummary, SellerSummary};

type Result<T> = std::result::Result<T, LifecycleError>;

/// Result of a committed cancel or reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reversal {
    pub order_id: OrderId,
    /// `Cancelled` or `Rejected`.
    pub outcome: OrderStatus,
    /// Lines whose quantities were added back to stock.
    pub restored: Vec<OrderItem>,
}

#[derive(Debug, Clone, Copy)]
enum Actor {
    Customer(CustomerId),
    Seller(SellerId),
}

impl Actor {
    fn outcome(self) -> OrderStatus {
        match self {
            Actor::Customer(_) => OrderStatus::Cancelled,
            Actor::Seller(_) => OrderStatus::Rejected,
        }
    }

    fn action(self) -> &'static str {
        match self {
            Actor::Customer(_) => "cancel",
            Actor::Seller(_) => "reject",
        }
    }
}

/// Drives status changes of placed orders.
///
/// Every mutation locks the order row first, so two concurrent operations on
/// one order serialize and a second reversal finds the order gone.
pub struct OrderLifecycle<S: Store> {
    store: S,
}

impl<S: Store> OrderLifecycle<S> {
    /// Creates a new lifecycle manager.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Gets a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cancels a pending order on behalf of the customer who placed it.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, customer_id = %customer_id))]
    pub async fn cancel(&self, order_id: OrderId, customer_id: CustomerId) -> Result<Reversal> {
        self.reverse(order_id, Actor::Customer(customer_id)).await
    }

    /// Rejects a pending order on behalf of a seller owning one of its products.
    ///
    /// Orders are not split by seller, so the whole order is reversed.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, seller_id = %seller_id))]
    pub async fn reject(&self, order_id: OrderId, seller_id: SellerId) -> Result<Reversal> {
        self.reverse(order_id, Actor::Seller(seller_id)).await
    }

    /// Marks a pending order delivered. Stock is not touched.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, seller_id = %seller_id))]
    pub async fn mark_delivered(&self, order_id: OrderId, seller_id: SellerId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        match deliver(&mut tx, order_id, seller_id).await {
            Ok(order) => {
                tx.commit().await?;
                tracing::info!("order delivered");
                Ok(order)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }

    async fn reverse(&self, order_id: OrderId, actor: Actor) -> Result<Reversal> {
        let mut tx = self.store.begin().await?;
        match reverse_in(&mut tx, order_id, actor).await {
            Ok(reversal) => {
                tx.commit().await?;
                metrics::counter!("order_reversals_total", "outcome" => reversal.outcome.as_str())
                    .increment(1);
                tracing::info!(
                    outcome = %reversal.outcome,
                    lines = reversal.restored.len(),
                    "order reversed"
                );
                Ok(reversal)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }

    /// Loads one order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(LifecycleError::NotFound(order_id))
    }

    /// Lists a customer's orders, newest first.
    pub async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        Ok(self
            .store
            .query_orders(OrderQuery::for_customer(customer_id))
            .await?)
    }

    /// Lists orders containing at least one of a seller's products, newest first.
    pub async fn orders_for_seller(&self, seller_id: SellerId) -> Result<Vec<Order>> {
        Ok(self
            .store
            .query_orders(OrderQuery::for_seller(seller_id))
            .await?)
    }

    /// Aggregates a customer's order history.
    pub async fn customer_summary(&self, customer_id: CustomerId) -> Result<CustomerSummary> {
        let orders = self.orders_for_customer(customer_id).await?;
        Ok(CustomerSummary::from_orders(customer_id, &orders))
    }

    /// Aggregates the orders touching a seller's products.
    pub async fn seller_summary(&self, seller_id: SellerId) -> Result<SellerSummary> {
        let orders = self.orders_for_seller(seller_id).await?;

        let product_ids: HashSet<ProductId> = orders
            .iter()
            .flat_map(|o| o.items.iter().map(|i| i.product_id))
            .collect();
        let mut owned = HashSet::new();
        for product_id in product_ids {
            if let Some(product) = self.store.get_product(product_id).await?
                && product.seller_id == seller_id
            {
                owned.insert(product_id);
            }
        }

        Ok(SellerSummary::from_orders(seller_id, &orders, &owned))
    }
}

async fn reverse_in<T: StoreTx>(tx: &mut T, order_id: OrderId, actor: Actor) -> Result<Reversal> {
    let order = tx
        .lock_order(order_id)
        .await?
        .ok_or(LifecycleError::NotFound(order_id))?;

    match actor {
        Actor::Customer(customer_id) => {
            if order.customer_id != customer_id {
                return Err(LifecycleError::NotOwner {
                    order_id,
                    customer_id,
                });
            }
        }
        Actor::Seller(seller_id) => {
            if !seller_owns_any(tx, &order, seller_id).await? {
                return Err(LifecycleError::NotAuthorized {
                    order_id,
                    seller_id,
                });
            }
        }
    }

    order.ensure_reversible(actor.action())?;

    let mut restored = order.items;
    restored.sort_by_key(|item| item.product_id);
    for item in &restored {
        tx.release(item.product_id, item.quantity).await?;
    }
    tx.delete_order(order_id).await?;

    Ok(Reversal {
        order_id,
        outcome: actor.outcome(),
        restored,
    })
}

async fn deliver<T: StoreTx>(tx: &mut T, order_id: OrderId, seller_id: SellerId) -> Result<Order> {
    let mut order = tx
        .lock_order(order_id)
        .await?
        .ok_or(LifecycleError::NotFound(order_id))?;

    if !seller_owns_any(tx, &order, seller_id).await? {
        return Err(LifecycleError::NotAuthorized {
            order_id,
            seller_id,
        });
    }
    order.ensure_deliverable()?;

    tx.set_order_status(order_id, OrderStatus::Delivered).await?;
    order.status = OrderStatus::Delivered;
    Ok(order)
}

async fn seller_owns_any<T: StoreTx>(tx: &mut T, order: &Order, seller_id: SellerId) -> Result<bool> {
    for item in &order.items {
        if let Some(product) = tx.product(item.product_id).await?
            && product.seller_id == seller_id
        {
            return Ok(true);
        }
    }
    Ok(false)
}
