//! Domain layer for the storefront order core.
//!
//! This crate holds the pure, I/O-free types shared by the store and the
//! checkout coordinator:
//! - `Money` and the product catalog record
//! - `Order`, `OrderItem` and the `OrderStatus` state machine
//! - `CartSnapshot`, the customer's uncommitted list of wanted products

pub mod cart;
pub mod order;
pub mod product;

pub use cart::{CartError, CartLine, CartSnapshot};
pub use common::{CustomerId, OrderId, OrderItemId, ProductId, SellerId};
pub use order::{Money, Order, OrderError, OrderItem, OrderStatus};
pub use product::{NewProduct, Product};
