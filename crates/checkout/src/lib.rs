//! Checkout and order reconciliation for the storefront.
//!
//! This crate turns a cart into an order and reverses orders again, keeping
//! product stock consistent under concurrent requests:
//! 1. `CheckoutCoordinator` locks every cart product in ascending id order,
//!    verifies stock, records the order and decrements stock in one
//!    transaction
//! 2. `OrderLifecycle` cancels, rejects or delivers a pending order, restoring
//!    exactly the reserved stock on the reversal paths
//!
//! Any failure rolls the open transaction back before it is returned.

pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod summary;

pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, LifecycleError};
pub use lifecycle::{OrderLifecycle, Reversal};
pub use summary::{CustomerSummary, SellerSummary};
