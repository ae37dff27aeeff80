//! Per-role dashboard aggregates over placed orders.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{CustomerId, ProductId, SellerId};
use domain::{Money, Order, OrderStatus};
use serde::Serialize;

/// A customer's order history at a glance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub customer_id: CustomerId,
    pub total_orders: usize,
    pub pending_orders: usize,
    pub delivered_orders: usize,
    /// Sum of the order totals.
    pub total_spent: Money,
    pub last_order_at: Option<DateTime<Utc>>,
}

impl CustomerSummary {
    pub fn from_orders(customer_id: CustomerId, orders: &[Order]) -> Self {
        Self {
            customer_id,
            total_orders: orders.len(),
            pending_orders: count_status(orders, OrderStatus::Pending),
            delivered_orders: count_status(orders, OrderStatus::Delivered),
            total_spent: orders.iter().map(|o| o.total).sum(),
            last_order_at: orders.iter().map(|o| o.placed_at).max(),
        }
    }
}

/// Orders touching a seller's products at a glance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellerSummary {
    pub seller_id: SellerId,
    pub total_orders: usize,
    pub pending_orders: usize,
    pub delivered_orders: usize,
    /// Sum of the seller's own line totals; other sellers' lines are excluded.
    pub revenue: Money,
    pub units_sold: u64,
}

impl SellerSummary {
    /// Builds the summary from orders and the set of product ids the seller owns.
    pub fn from_orders(seller_id: SellerId, orders: &[Order], owned: &HashSet<ProductId>) -> Self {
        let own_items = || {
            orders
                .iter()
                .flat_map(|o| o.items.iter())
                .filter(|item| owned.contains(&item.product_id))
        };

        Self {
            seller_id,
            total_orders: orders.len(),
            pending_orders: count_status(orders, OrderStatus::Pending),
            delivered_orders: count_status(orders, OrderStatus::Delivered),
            revenue: own_items().map(|item| item.line_total()).sum(),
            units_sold: own_items().map(|item| u64::from(item.quantity)).sum(),
        }
    }
}

fn count_status(orders: &[Order], status: OrderStatus) -> usize {
    orders.iter().filter(|o| o.status == status).count()
}
