//! Checkout and reversal races against PostgreSQL row locks.
//!
//! These tests use a shared PostgreSQL container and need a Docker daemon.
//! Each test truncates the tables, so they run serially.
//! Run with:
//!
//! ```bash
//! cargo test -p checkout --test postgres_checkout
//! ```

use std::{sync::Arc, time::Duration};

use checkout::{CheckoutCoordinator, CheckoutError, LifecycleError, OrderLifecycle};
use common::{CustomerId, ProductId, SellerId};
use domain::{CartSnapshot, Money, NewProduct};
use serial_test::serial;
use sqlx::PgPool;
use store::{OrderQuery, PgStore, Store, StoreOptions};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

struct PgHarness {
    store: PgStore,
    coordinator: Arc<CheckoutCoordinator<PgStore>>,
    lifecycle: Arc<OrderLifecycle<PgStore>>,
}

impl PgHarness {
    async fn new() -> Self {
        let info = get_container_info().await;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&info.connection_string)
            .await
            .unwrap();

        sqlx::query("TRUNCATE TABLE order_items, orders, products, saved_carts RESTART IDENTITY")
            .execute(&pool)
            .await
            .unwrap();

        let store = PgStore::with_options(pool, StoreOptions::default());
        Self {
            coordinator: Arc::new(CheckoutCoordinator::new(store.clone())),
            lifecycle: Arc::new(OrderLifecycle::new(store.clone())),
            store,
        }
    }

    async fn product(&self, quantity: u32) -> ProductId {
        self.store
            .create_product(NewProduct::new(
                SellerId::new(1),
                "Item",
                Money::from_cents(100),
                quantity,
            ))
            .await
            .unwrap()
            .id
    }

    async fn stock(&self, product_id: ProductId) -> u32 {
        self.store
            .get_product(product_id)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    async fn order_count(&self) -> usize {
        self.store.query_orders(OrderQuery::new()).await.unwrap().len()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_checkouts_never_oversell() {
    let h = PgHarness::new().await;
    let p1 = h.product(5).await;

    let mut handles = Vec::new();
    for n in 0..20 {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            let mut cart = CartSnapshot::from_lines([(p1, 1)]).unwrap();
            coordinator.checkout(CustomerId::new(n), &mut cart).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(CheckoutError::InsufficientStock(id)) => assert_eq!(id, p1),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(h.stock(p1).await, 0);
    assert_eq!(h.order_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn last_unit_goes_to_exactly_one_customer() {
    let h = PgHarness::new().await;
    let p1 = h.product(1).await;

    let (a, b) = tokio::join!(
        {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                let mut cart = CartSnapshot::from_lines([(p1, 1)]).unwrap();
                coordinator.checkout(CustomerId::new(1), &mut cart).await
            })
        },
        {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                let mut cart = CartSnapshot::from_lines([(p1, 1)]).unwrap();
                coordinator.checkout(CustomerId::new(2), &mut cart).await
            })
        }
    );
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(CheckoutError::InsufficientStock(id)) if *id == p1))
    );
    assert_eq!(h.stock(p1).await, 0);
    assert_eq!(h.order_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn overlapping_carts_in_opposite_order_do_not_deadlock() {
    let h = PgHarness::new().await;
    let p1 = h.product(100).await;
    let p2 = h.product(100).await;

    let mut handles = Vec::new();
    for n in 0..20 {
        let coordinator = h.coordinator.clone();
        let lines = if n % 2 == 0 {
            [(p1, 1), (p2, 1)]
        } else {
            [(p2, 1), (p1, 1)]
        };
        handles.push(tokio::spawn(async move {
            let mut cart = CartSnapshot::from_lines(lines).unwrap();
            coordinator.checkout(CustomerId::new(n), &mut cart).await
        }));
    }

    let all = tokio::time::timeout(Duration::from_secs(30), async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    })
    .await;

    assert!(all.is_ok());
    assert_eq!(h.stock(p1).await, 80);
    assert_eq!(h.stock(p2).await, 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_cancels_restore_once() {
    let h = PgHarness::new().await;
    let p1 = h.product(10).await;
    let p2 = h.product(10).await;

    let mut cart = CartSnapshot::from_lines([(p1, 2), (p2, 3)]).unwrap();
    let order = h
        .coordinator
        .checkout(CustomerId::new(1), &mut cart)
        .await
        .unwrap();
    let order_id = order.id;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let lifecycle = h.lifecycle.clone();
        handles.push(tokio::spawn(async move {
            lifecycle.cancel(order_id, CustomerId::new(1)).await
        }));
    }

    let mut reversed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => reversed += 1,
            Err(LifecycleError::NotFound(id)) => assert_eq!(id, order_id),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(reversed, 1);
    assert_eq!(h.stock(p1).await, 10);
    assert_eq!(h.stock(p2).await, 10);
    assert!(h.store.get_order(order_id).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_saved_cart_checkouts_place_one_order() {
    let h = PgHarness::new().await;
    let p1 = h.product(10).await;
    let customer = CustomerId::new(8);
    h.store
        .save_cart(customer, &CartSnapshot::from_lines([(p1, 2)]).unwrap())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.checkout_saved_cart(customer).await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(CheckoutError::EmptyCart) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(h.stock(p1).await, 8);
    assert_eq!(h.order_count().await, 1);
    assert!(h.store.load_cart(customer).await.unwrap().is_none());
}
