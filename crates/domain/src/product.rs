//! Catalog product with its stock record.

use common::{ProductId, SellerId};
use serde::{Deserialize, Serialize};

use crate::order::Money;

/// A product and its available quantity.
///
/// `quantity` is unsigned, so the stock record cannot represent a negative
/// level; the store only ever changes it through conditional reservation and
/// additive release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
}

impl Product {
    /// Returns true if `requested` units can be taken from stock.
    pub fn has_stock_for(&self, requested: u32) -> bool {
        self.quantity >= requested
    }
}

/// Payload for listing a new product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub seller_id: SellerId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
}

impl NewProduct {
    pub fn new(seller_id: SellerId, name: impl Into<String>, price: Money, quantity: u32) -> Self {
        Self {
            seller_id,
            name: name.into(),
            price,
            quantity,
        }
    }
}
