use common::{CustomerId, SellerId};
use domain::{Order, OrderStatus};

/// Builder for order listing queries.
///
/// Filters combine with AND. A seller filter matches orders that contain at
/// least one line for a product the seller owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Filter by the customer who placed the order.
    pub customer_id: Option<CustomerId>,

    /// Filter by a seller owning at least one line's product.
    pub seller_id: Option<SellerId>,

    /// Filter by status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one customer's orders.
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    /// Creates a query for orders touching one seller's products.
    pub fn for_seller(seller_id: SellerId) -> Self {
        Self {
            seller_id: Some(seller_id),
            ..Default::default()
        }
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Applies the customer and status filters to an order.
    ///
    /// The seller filter needs product ownership and is applied by the store.
    pub(crate) fn matches_header(&self, order: &Order) -> bool {
        if let Some(customer_id) = self.customer_id
            && order.customer_id != customer_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_filters() {
        let query = OrderQuery::for_customer(CustomerId::new(3))
            .status(OrderStatus::Pending)
            .limit(10);

        assert_eq!(query.customer_id, Some(CustomerId::new(3)));
        assert_eq!(query.seller_id, None);
        assert_eq!(query.status, Some(OrderStatus::Pending));
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn seller_query_has_no_customer_filter() {
        let query = OrderQuery::for_seller(SellerId::new(8));
        assert_eq!(query.seller_id, Some(SellerId::new(8)));
        assert!(query.customer_id.is_none());
    }
}
