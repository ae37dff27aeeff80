//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of a placed order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Delivered
///           ├──► Cancelled   (customer reversal, stock restored)
///           └──► Rejected    (seller reversal, stock restored)
/// ```
///
/// Every state other than `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Placed; stock for every line is already reserved.
    #[default]
    Pending,

    /// Handed over to the customer (terminal state).
    Delivered,

    /// Withdrawn by the customer (terminal state).
    Cancelled,

    /// Refused by the seller (terminal state).
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order can be marked delivered in this state.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled or rejected in this state.
    pub fn can_reverse(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns the status name as stored and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a stored status string is not a known status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            "Rejected" => Ok(OrderStatus::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_only_pending_can_deliver() {
        assert!(OrderStatus::Pending.can_deliver());
        assert!(!OrderStatus::Delivered.can_deliver());
        assert!(!OrderStatus::Cancelled.can_deliver());
        assert!(!OrderStatus::Rejected.can_deliver());
    }

    #[test]
    fn test_only_pending_can_reverse() {
        assert!(OrderStatus::Pending.can_reverse());
        assert!(!OrderStatus::Delivered.can_reverse());
        assert!(!OrderStatus::Cancelled.can_reverse());
        assert!(!OrderStatus::Rejected.can_reverse());
    }

    #[test]
    fn test_parse_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }
}
