//! Cart snapshot: the customer's uncommitted list of wanted products.

use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by cart edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity must be greater than zero.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The cart has no line for the product.
    #[error("Product {0} is not in the cart")]
    NotInCart(ProductId),
}

/// A single wanted product and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Ordered list of cart lines, at most one per product.
///
/// The snapshot is ephemeral: it lives with the customer's session until a
/// checkout commits it, and is only persisted when the customer saves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartSnapshot {
    lines: Vec<CartLine>,
}

impl CartSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from raw lines, merging repeated products.
    pub fn from_lines(
        lines: impl IntoIterator<Item = (ProductId, u32)>,
    ) -> Result<Self, CartError> {
        let mut cart = Self::new();
        for (product_id, quantity) in lines {
            cart.add(product_id, quantity)?;
        }
        Ok(cart)
    }

    /// Adds units of a product, merging into an existing line.
    pub fn add(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine {
                product_id,
                quantity,
            }),
        }
        Ok(())
    }

    /// Sets the quantity of an existing line. Zero removes the line.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        let index = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or(CartError::NotInCart(product_id))?;

        if quantity == 0 {
            self.lines.remove(index);
        } else if let Some(line) = self.lines.get_mut(index) {
            line.quantity = quantity;
        }
        Ok(())
    }

    /// Removes a product's line. Returns false if the product was not in the cart.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Lines in the order they were first added.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Lines sorted by ascending product id.
    ///
    /// Every transaction that locks several stock records takes them in this
    /// order, so overlapping checkouts cannot wait on each other in a cycle.
    pub fn locking_order(&self) -> Vec<CartLine> {
        let mut lines = self.lines.clone();
        lines.sort_by_key(|l| l.product_id);
        lines
    }

    /// Serializes the snapshot verbatim for a saved cart.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Restores a snapshot from a saved cart.
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
