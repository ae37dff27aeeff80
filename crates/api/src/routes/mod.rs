pub mod carts;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use common::ProductId;
use serde::{Deserialize, Serialize};

/// A (product, quantity) pair as it appears in request and response bodies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineBody {
    pub product_id: ProductId,
    pub quantity: u32,
}
