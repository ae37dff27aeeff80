use serde::{Deserialize, Serialize};

/// Declares an integer-backed identifier newtype.
///
/// Identifiers are assigned by the store in insertion order, so they sort
/// the same way the rows were created. Wrapping them keeps a product id from
/// being passed where an order id is expected.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a product (and of its stock record).
    ProductId
);

define_id!(
    /// Identifier of a placed order.
    OrderId
);

define_id!(
    /// Identifier of a single order line.
    OrderItemId
);

define_id!(
    /// Identifier of the customer who owns carts and orders.
    CustomerId
);

define_id!(
    /// Identifier of the seller who owns products.
    SellerId
);
