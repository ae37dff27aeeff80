use std::time::Duration;

use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId};
use domain::{CartSnapshot, Money, NewProduct, Order, OrderItem, OrderStatus, Product};

use crate::{OrderQuery, Result};

/// Tuning shared by store implementations.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Upper bound on how long a transaction waits for a single row lock.
    pub lock_timeout: Duration,
}

impl StoreOptions {
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented; `remaining` is the level afterwards.
    Reserved { remaining: u32 },
    /// Stock was left untouched because fewer than the requested units exist.
    Insufficient { available: u32 },
}

/// Header of an order about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub total: Money,
    pub status: OrderStatus,
}

/// Line of an order about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A single atomic unit of work against the store.
///
/// Row locks taken through a transaction are held until [`StoreTx::commit`]
/// or [`StoreTx::rollback`]. Dropping a transaction without committing rolls
/// it back. Nothing written through a transaction is visible to other
/// readers before commit.
#[async_trait]
pub trait StoreTx: Send + Sized {
    /// Locks a product's stock record and returns it as seen by this transaction.
    ///
    /// Blocks while another transaction holds the lock, up to the configured
    /// lock timeout. Returns None if the product does not exist.
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    /// Reads a product without locking it.
    async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    /// Decrements stock by `quantity` only if at least that much is available.
    ///
    /// Takes the product lock first if this transaction does not hold it yet.
    async fn try_reserve(&mut self, product_id: ProductId, quantity: u32)
    -> Result<ReserveOutcome>;

    /// Adds `quantity` back to a product's stock.
    async fn release(&mut self, product_id: ProductId, quantity: u32) -> Result<()>;

    /// Inserts an order header and returns it with its assigned id.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    /// Inserts one order line.
    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem>;

    /// Locks an order row and returns it with its lines. None if it does not exist.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Sets the status of an order.
    async fn set_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()>;

    /// Deletes an order's lines and then the order itself.
    async fn delete_order(&mut self, order_id: OrderId) -> Result<()>;

    /// Removes a customer's saved cart and returns it. None if there is none.
    ///
    /// Locks the saved cart, so of two transactions taking the same cart only
    /// the first to commit receives it.
    async fn take_saved_cart(&mut self, customer_id: CustomerId) -> Result<Option<CartSnapshot>>;

    /// Makes every change of this transaction visible and releases its locks.
    async fn commit(self) -> Result<()>;

    /// Discards every change of this transaction and releases its locks.
    async fn rollback(self) -> Result<()>;
}

/// Core trait for store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and cheap to clone
/// into concurrent request handlers.
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: StoreTx;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Lists a new product with its initial stock.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;

    /// Reads the committed state of a product.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Changes a product's list price.
    ///
    /// Takes the product's row lock, so a checkout that already locked the
    /// product keeps seeing the price it read. Existing order lines keep
    /// their purchase price.
    async fn update_product_price(&self, product_id: ProductId, price: Money) -> Result<Product>;

    /// Reads the committed state of an order with its lines.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching a query, newest first.
    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Stores a verbatim copy of a customer's cart, replacing any earlier copy.
    async fn save_cart(&self, customer_id: CustomerId, cart: &CartSnapshot) -> Result<()>;

    /// Loads a customer's saved cart.
    async fn load_cart(&self, customer_id: CustomerId) -> Result<Option<CartSnapshot>>;

    /// Deletes a customer's saved cart. Returns false if there was none.
    async fn delete_saved_cart(&self, customer_id: CustomerId) -> Result<bool>;
}
