//! Transactional persistence for products, stock, orders and saved carts.
//!
//! The [`Store`] trait opens [`StoreTx`] units of work. A transaction holds
//! row-level exclusivity on every product and order it touches until it
//! commits or rolls back, which is what lets the checkout coordinator check
//! stock and decrement it without another checkout slipping in between.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use query::OrderQuery;
pub use store::{NewOrder, NewOrderItem, ReserveOutcome, Store, StoreOptions, StoreTx};
