use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OrderItemId, ProductId, SellerId};
use domain::{CartSnapshot, Money, NewProduct, Order, OrderItem, OrderStatus, Product};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    OrderQuery, Result, StoreError,
    store::{NewOrder, NewOrderItem, ReserveOutcome, Store, StoreOptions, StoreTx},
};

const PRODUCT_COLUMNS: &str = "id, seller_id, name, price_cents, quantity";
const ORDER_COLUMNS: &str = "id, customer_id, total_cents, status, placed_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, price_cents";

/// PostgreSQL-backed store implementation.
///
/// Row exclusivity comes from `SELECT ... FOR UPDATE`; every transaction sets
/// a local `lock_timeout` so a blocked lock surfaces as
/// [`StoreError::LockTimeout`] instead of waiting indefinitely.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    options: StoreOptions,
}

impl PgStore {
    /// Creates a new PostgreSQL store with default options.
    pub fn new(pool: PgPool) -> Self {
        Self::with_options(pool, StoreOptions::default())
    }

    /// Creates a new PostgreSQL store.
    pub fn with_options(pool: PgPool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    async fn begin_tx(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.options.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn load_items(&self, order_ids: &[i64]) -> Result<HashMap<OrderId, Vec<OrderItem>>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id ASC"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = row_to_item(&row)?;
            items.entry(item.order_id).or_default().push(item);
        }
        Ok(items)
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidData(format!("{column} is {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} {value} exceeds INTEGER")))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        seller_id: SellerId::new(row.try_get("seller_id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("price_cents")?),
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        customer_id: CustomerId::new(row.try_get("customer_id")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?,
        placed_at: row.try_get::<DateTime<Utc>, _>("placed_at")?,
        items,
    })
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        Ok(PgTx {
            tx: self.begin_tx().await?,
        })
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            "INSERT INTO products (seller_id, name, price_cents, quantity) VALUES ($1, $2, $3, $4) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product.seller_id.get())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(to_i32(product.quantity, "quantity")?)
        .fetch_one(&self.pool)
        .await?;

        row_to_product(&row)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn update_product_price(&self, product_id: ProductId, price: Money) -> Result<Product> {
        let mut tx = self.begin_tx().await?;
        let row = sqlx::query(&format!(
            "UPDATE products SET price_cents = $2 WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product_id.get())
        .bind(price.cents())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::ProductNotFound(product_id))?;
        tx.commit().await?;

        tracing::debug!(%product_id, price = %price, "product price updated");
        row_to_product(&row)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let Some(row) = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.get())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut items = self.load_items(&[order_id.get()]).await?;
        row_to_order(&row, items.remove(&order_id).unwrap_or_default()).map(Some)
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = String::from(
            "SELECT o.id, o.customer_id, o.total_cents, o.status, o.placed_at FROM orders o WHERE 1=1",
        );
        let mut param_count = 0;

        // Build dynamic query
        if query.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.customer_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.status = ${param_count}"));
        }
        if query.seller_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM order_items oi JOIN products p ON p.id = oi.product_id \
                 WHERE oi.order_id = o.id AND p.seller_id = ${param_count})"
            ));
        }

        sql.push_str(" ORDER BY o.id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(customer_id) = query.customer_id {
            sqlx_query = sqlx_query.bind(customer_id.get());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(seller_id) = query.seller_id {
            sqlx_query = sqlx_query.bind(seller_id.get());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let ids: Vec<i64> = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut items = self.load_items(&ids).await?;

        rows.iter()
            .map(|row| {
                let id = OrderId::new(row.try_get("id")?);
                row_to_order(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn save_cart(&self, customer_id: CustomerId, cart: &CartSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saved_carts (customer_id, cart_data, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (customer_id) DO UPDATE SET
                cart_data = EXCLUDED.cart_data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(customer_id.get())
        .bind(cart.to_json()?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_cart(&self, customer_id: CustomerId) -> Result<Option<CartSnapshot>> {
        let data: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT cart_data FROM saved_carts WHERE customer_id = $1")
                .bind(customer_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(data.map(CartSnapshot::from_json).transpose()?)
    }

    async fn delete_saved_cart(&self, customer_id: CustomerId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_carts WHERE customer_id = $1")
            .bind(customer_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Transaction over a [`PgStore`].
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn select_product(&mut self, product_id: ProductId, lock: bool) -> Result<Option<Product>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1{suffix}"
        ))
        .bind(product_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        self.select_product(product_id, true).await
    }

    async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        self.select_product(product_id, false).await
    }

    async fn try_reserve(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome> {
        let Some(product) = self.select_product(product_id, true).await? else {
            return Ok(ReserveOutcome::Insufficient { available: 0 });
        };
        if !product.has_stock_for(quantity) {
            return Ok(ReserveOutcome::Insufficient {
                available: product.quantity,
            });
        }

        let remaining: i32 = sqlx::query_scalar(
            "UPDATE products SET quantity = quantity - $2 WHERE id = $1 AND quantity >= $2 RETURNING quantity",
        )
        .bind(product_id.get())
        .bind(to_i32(quantity, "quantity")?)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(ReserveOutcome::Reserved {
            remaining: to_u32(remaining, "quantity")?,
        })
    }

    async fn release(&mut self, product_id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET quantity = quantity + $2 WHERE id = $1")
            .bind(product_id.get())
            .bind(to_i32(quantity, "quantity")?)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(product_id));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(&format!(
            "INSERT INTO orders (customer_id, total_cents, status) VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.customer_id.get())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_order(&row, Vec::new())
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem> {
        let row = sqlx::query(&format!(
            "INSERT INTO order_items (order_id, product_id, quantity, price_cents) VALUES ($1, $2, $3, $4) RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item.order_id.get())
        .bind(item.product_id.get())
        .bind(to_i32(item.quantity, "quantity")?)
        .bind(item.unit_price.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_item(&row)
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let Some(row) = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.get())
        .fetch_optional(&mut *self.tx)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id ASC"
        ))
        .bind(order_id.get())
        .fetch_all(&mut *self.tx)
        .await?
        .iter()
        .map(row_to_item)
        .collect::<Result<Vec<_>>>()?;

        row_to_order(&row, items).map(Some)
    }

    async fn set_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id.get())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn delete_order(&mut self, order_id: OrderId) -> Result<()> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn take_saved_cart(&mut self, customer_id: CustomerId) -> Result<Option<CartSnapshot>> {
        let data: Option<serde_json::Value> = sqlx::query_scalar(
            "DELETE FROM saved_carts WHERE customer_id = $1 RETURNING cart_data",
        )
        .bind(customer_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(data.map(CartSnapshot::from_json).transpose()?)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
