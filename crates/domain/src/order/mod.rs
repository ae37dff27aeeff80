//! Placed orders and their lines.

mod state;
mod value_objects;

pub use state::{OrderStatus, UnknownStatus};
pub use value_objects::{Money, OrderItem};

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by order state checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order is not in a state that allows the requested action.
    #[error("Invalid state transition: cannot {action} order {order_id} from {current} state")]
    InvalidStateTransition {
        order_id: OrderId,
        current: OrderStatus,
        action: &'static str,
    },
}

/// A placed order together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    /// Sum of the line totals, fixed when the order is placed.
    pub total: Money,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Recomputes the sum of the line totals.
    ///
    /// The stored `total` is never replaced by this value; it exists so
    /// callers can check the two agree.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// Fails unless the order can be cancelled or rejected.
    pub fn ensure_reversible(&self, action: &'static str) -> Result<(), OrderError> {
        self.ensure(self.status.can_reverse(), action)
    }

    /// Fails unless the order can be marked delivered.
    pub fn ensure_deliverable(&self) -> Result<(), OrderError> {
        self.ensure(self.status.can_deliver(), "deliver")
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> Result<(), OrderError> {
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                order_id: self.id,
                current: self.status,
                action,
            })
        }
    }
}
