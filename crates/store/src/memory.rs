use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, OrderId, OrderItemId, ProductId};
use domain::{CartSnapshot, Money, NewProduct, Order, OrderItem, OrderStatus, Product};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    OrderQuery, Result, StoreError,
    store::{NewOrder, NewOrderItem, ReserveOutcome, Store, StoreOptions, StoreTx},
};

/// Committed state.
#[derive(Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    saved_carts: HashMap<CustomerId, CartSnapshot>,
}

/// One async mutex per row, created on first use.
struct RowLocks<K> {
    rows: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Copy + std::fmt::Debug> RowLocks<K> {
    fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: K, timeout: Duration) -> Result<OwnedMutexGuard<()>> {
        let row = self.rows.lock().await.entry(key).or_default().clone();
        tokio::time::timeout(timeout, row.lock_owned())
            .await
            .map_err(|_| {
                tracing::debug!(row = ?key, ?timeout, "row lock wait timed out");
                StoreError::LockTimeout(timeout)
            })
    }

    /// Forgets the locks for `keys` that nobody holds or waits on.
    async fn prune(&self, keys: impl IntoIterator<Item = K>) {
        let mut rows = self.rows.lock().await;
        for key in keys {
            if rows.get(&key).is_some_and(|row| Arc::strong_count(row) == 1) {
                rows.remove(&key);
            }
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.rows.lock().await.len()
    }
}

struct Shared {
    tables: RwLock<Tables>,
    product_locks: RowLocks<ProductId>,
    order_locks: RowLocks<OrderId>,
    cart_locks: RowLocks<CustomerId>,
    next_product_id: AtomicI64,
    next_order_id: AtomicI64,
    next_item_id: AtomicI64,
    options: StoreOptions,
}

/// In-memory store implementation.
///
/// Mirrors the locking behaviour of the PostgreSQL store: each product and
/// order row has its own lock, held by a transaction until it finishes, and
/// a transaction's writes are staged privately and applied in one step at
/// commit.
#[derive(Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store with default options.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Creates a new empty in-memory store.
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                product_locks: RowLocks::new(),
                order_locks: RowLocks::new(),
                cart_locks: RowLocks::new(),
                next_product_id: AtomicI64::new(1),
                next_order_id: AtomicI64::new(1),
                next_item_id: AtomicI64::new(1),
                options,
            }),
        }
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.shared.tables.read().await.orders.len()
    }

    /// Returns the committed stock level of every product.
    pub async fn stock_levels(&self) -> BTreeMap<ProductId, u32> {
        self.shared
            .tables
            .read()
            .await
            .products
            .values()
            .map(|p| (p.id, p.quantity))
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        Ok(InMemoryTx {
            shared: self.shared.clone(),
            product_guards: HashMap::new(),
            order_guards: HashMap::new(),
            cart_guards: HashMap::new(),
            stock_deltas: BTreeMap::new(),
            inserted: BTreeMap::new(),
            appended_items: Vec::new(),
            status_changes: BTreeMap::new(),
            deleted: BTreeSet::new(),
            taken_carts: BTreeSet::new(),
        })
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let id = ProductId::new(self.shared.next_product_id.fetch_add(1, Ordering::SeqCst));
        let product = Product {
            id,
            seller_id: product.seller_id,
            name: product.name,
            price: product.price,
            quantity: product.quantity,
        };
        self.shared
            .tables
            .write()
            .await
            .products
            .insert(id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self
            .shared
            .tables
            .read()
            .await
            .products
            .get(&product_id)
            .cloned())
    }

    async fn update_product_price(&self, product_id: ProductId, price: Money) -> Result<Product> {
        let _row = self
            .shared
            .product_locks
            .acquire(product_id, self.shared.options.lock_timeout)
            .await?;

        let mut tables = self.shared.tables.write().await;
        let product = tables
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;
        product.price = price;
        Ok(product.clone())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.shared.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let tables = self.shared.tables.read().await;
        let owned_by_seller = |order: &Order| match query.seller_id {
            None => true,
            Some(seller_id) => order.items.iter().any(|item| {
                tables
                    .products
                    .get(&item.product_id)
                    .is_some_and(|p| p.seller_id == seller_id)
            }),
        };

        let orders = tables
            .orders
            .values()
            .rev()
            .filter(|o| query.matches_header(o) && owned_by_seller(*o))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(orders)
    }

    async fn save_cart(&self, customer_id: CustomerId, cart: &CartSnapshot) -> Result<()> {
        let row = self
            .shared
            .cart_locks
            .acquire(customer_id, self.shared.options.lock_timeout)
            .await?;
        self.shared
            .tables
            .write()
            .await
            .saved_carts
            .insert(customer_id, cart.clone());
        drop(row);
        self.shared.cart_locks.prune([customer_id]).await;
        Ok(())
    }

    async fn load_cart(&self, customer_id: CustomerId) -> Result<Option<CartSnapshot>> {
        Ok(self
            .shared
            .tables
            .read()
            .await
            .saved_carts
            .get(&customer_id)
            .cloned())
    }

    async fn delete_saved_cart(&self, customer_id: CustomerId) -> Result<bool> {
        let row = self
            .shared
            .cart_locks
            .acquire(customer_id, self.shared.options.lock_timeout)
            .await?;
        let removed = self
            .shared
            .tables
            .write()
            .await
            .saved_carts
            .remove(&customer_id)
            .is_some();
        drop(row);
        self.shared.cart_locks.prune([customer_id]).await;
        Ok(removed)
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTx {
    shared: Arc<Shared>,
    product_guards: HashMap<ProductId, OwnedMutexGuard<()>>,
    order_guards: HashMap<OrderId, OwnedMutexGuard<()>>,
    cart_guards: HashMap<CustomerId, OwnedMutexGuard<()>>,
    stock_deltas: BTreeMap<ProductId, i64>,
    /// Orders created by this transaction, invisible to everyone else.
    inserted: BTreeMap<OrderId, Order>,
    /// Lines added to orders that were already committed.
    appended_items: Vec<OrderItem>,
    status_changes: BTreeMap<OrderId, OrderStatus>,
    deleted: BTreeSet<OrderId>,
    /// Saved carts removed by this transaction.
    taken_carts: BTreeSet<CustomerId>,
}

impl InMemoryTx {
    async fn lock_product_row(&mut self, product_id: ProductId) -> Result<()> {
        if !self.product_guards.contains_key(&product_id) {
            let guard = self
                .shared
                .product_locks
                .acquire(product_id, self.shared.options.lock_timeout)
                .await?;
            self.product_guards.insert(product_id, guard);
        }
        Ok(())
    }

    async fn lock_order_row(&mut self, order_id: OrderId) -> Result<()> {
        if !self.order_guards.contains_key(&order_id) {
            let guard = self
                .shared
                .order_locks
                .acquire(order_id, self.shared.options.lock_timeout)
                .await?;
            self.order_guards.insert(order_id, guard);
        }
        Ok(())
    }

    /// Committed product with this transaction's stock changes applied.
    async fn visible_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let tables = self.shared.tables.read().await;
        let Some(mut product) = tables.products.get(&product_id).cloned() else {
            return Ok(None);
        };
        let delta = self.stock_deltas.get(&product_id).copied().unwrap_or(0);
        product.quantity = apply_delta(product_id, product.quantity, delta)?;
        Ok(Some(product))
    }

    /// Committed order with this transaction's changes applied.
    async fn visible_committed_order(&self, order_id: OrderId) -> Option<Order> {
        if self.deleted.contains(&order_id) {
            return None;
        }
        let tables = self.shared.tables.read().await;
        let mut order = tables.orders.get(&order_id).cloned()?;
        if let Some(status) = self.status_changes.get(&order_id) {
            order.status = *status;
        }
        order.items.extend(
            self.appended_items
                .iter()
                .filter(|item| item.order_id == order_id)
                .cloned(),
        );
        Some(order)
    }
}

impl InMemoryTx {
    async fn release_locks(self) {
        let shared = self.shared.clone();
        let orders: Vec<OrderId> = self.order_guards.keys().copied().collect();
        let carts: Vec<CustomerId> = self.cart_guards.keys().copied().collect();
        drop(self);
        shared.order_locks.prune(orders).await;
        shared.cart_locks.prune(carts).await;
    }
}

fn apply_delta(product_id: ProductId, quantity: u32, delta: i64) -> Result<u32> {
    u32::try_from(i64::from(quantity) + delta).map_err(|_| {
        StoreError::InvalidData(format!(
            "stock for product {product_id} would leave the range 0..={}",
            u32::MAX
        ))
    })
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        self.lock_product_row(product_id).await?;
        self.visible_product(product_id).await
    }

    async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        self.visible_product(product_id).await
    }

    async fn try_reserve(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome> {
        self.lock_product_row(product_id).await?;
        let Some(product) = self.visible_product(product_id).await? else {
            return Ok(ReserveOutcome::Insufficient { available: 0 });
        };

        if !product.has_stock_for(quantity) {
            return Ok(ReserveOutcome::Insufficient {
                available: product.quantity,
            });
        }

        *self.stock_deltas.entry(product_id).or_insert(0) -= i64::from(quantity);
        Ok(ReserveOutcome::Reserved {
            remaining: product.quantity - quantity,
        })
    }

    async fn release(&mut self, product_id: ProductId, quantity: u32) -> Result<()> {
        self.lock_product_row(product_id).await?;
        let product = self
            .visible_product(product_id)
            .await?
            .ok_or(StoreError::ProductNotFound(product_id))?;
        apply_delta(product_id, product.quantity, i64::from(quantity))?;

        *self.stock_deltas.entry(product_id).or_insert(0) += i64::from(quantity);
        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let id = OrderId::new(self.shared.next_order_id.fetch_add(1, Ordering::SeqCst));
        let order = Order {
            id,
            customer_id: order.customer_id,
            total: order.total,
            status: order.status,
            placed_at: Utc::now(),
            items: Vec::new(),
        };
        self.inserted.insert(id, order.clone());
        Ok(order)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem> {
        let line = OrderItem {
            id: OrderItemId::new(self.shared.next_item_id.fetch_add(1, Ordering::SeqCst)),
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
        };

        if let Some(order) = self.inserted.get_mut(&item.order_id) {
            order.items.push(line.clone());
            return Ok(line);
        }

        self.lock_order_row(item.order_id).await?;
        if self.visible_committed_order(item.order_id).await.is_none() {
            return Err(StoreError::OrderNotFound(item.order_id));
        }
        self.appended_items.push(line.clone());
        Ok(line)
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        if let Some(order) = self.inserted.get(&order_id) {
            return Ok(Some(order.clone()));
        }
        self.lock_order_row(order_id).await?;
        Ok(self.visible_committed_order(order_id).await)
    }

    async fn set_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        if let Some(order) = self.inserted.get_mut(&order_id) {
            order.status = status;
            return Ok(());
        }
        self.lock_order_row(order_id).await?;
        if self.visible_committed_order(order_id).await.is_none() {
            return Err(StoreError::OrderNotFound(order_id));
        }
        self.status_changes.insert(order_id, status);
        Ok(())
    }

    async fn delete_order(&mut self, order_id: OrderId) -> Result<()> {
        if self.inserted.remove(&order_id).is_some() {
            return Ok(());
        }
        self.lock_order_row(order_id).await?;
        if self.visible_committed_order(order_id).await.is_none() {
            return Err(StoreError::OrderNotFound(order_id));
        }
        self.appended_items.retain(|item| item.order_id != order_id);
        self.status_changes.remove(&order_id);
        self.deleted.insert(order_id);
        Ok(())
    }

    async fn take_saved_cart(&mut self, customer_id: CustomerId) -> Result<Option<CartSnapshot>> {
        if !self.cart_guards.contains_key(&customer_id) {
            let guard = self
                .shared
                .cart_locks
                .acquire(customer_id, self.shared.options.lock_timeout)
                .await?;
            self.cart_guards.insert(customer_id, guard);
        }
        if !self.taken_carts.insert(customer_id) {
            return Ok(None);
        }
        Ok(self
            .shared
            .tables
            .read()
            .await
            .saved_carts
            .get(&customer_id)
            .cloned())
    }

    async fn commit(self) -> Result<()> {
        let mut tables = self.shared.tables.write().await;

        // Validate every stock change before touching anything.
        let mut new_levels = Vec::with_capacity(self.stock_deltas.len());
        for (&product_id, &delta) in &self.stock_deltas {
            let product = tables
                .products
                .get(&product_id)
                .ok_or(StoreError::ProductNotFound(product_id))?;
            new_levels.push((product_id, apply_delta(product_id, product.quantity, delta)?));
        }

        for (product_id, quantity) in new_levels {
            if let Some(product) = tables.products.get_mut(&product_id) {
                product.quantity = quantity;
            }
        }
        for item in &self.appended_items {
            if let Some(order) = tables.orders.get_mut(&item.order_id) {
                order.items.push(item.clone());
            }
        }
        for (order_id, status) in &self.status_changes {
            if let Some(order) = tables.orders.get_mut(order_id) {
                order.status = *status;
            }
        }
        for order_id in &self.deleted {
            tables.orders.remove(order_id);
        }
        tables.orders.extend(self.inserted.clone());
        for customer_id in &self.taken_carts {
            tables.saved_carts.remove(customer_id);
        }

        // Row locks are released only once the new state is in place.
        drop(tables);
        self.release_locks().await;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.release_locks().await;
        Ok(())
    }
}
