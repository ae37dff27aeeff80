//! Integration tests for checkout and order reversal against the in-memory store.

use std::{sync::Arc, time::Duration};

use checkout::{CheckoutCoordinator, CheckoutError, LifecycleError, OrderLifecycle};
use common::{CustomerId, OrderId, ProductId, SellerId};
use domain::{CartSnapshot, Money, NewProduct, OrderError, OrderStatus};
use store::{InMemoryStore, OrderQuery, Store, StoreOptions, StoreTx};

struct TestHarness {
    store: InMemoryStore,
    coordinator: Arc<CheckoutCoordinator<InMemoryStore>>,
    lifecycle: OrderLifecycle<InMemoryStore>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    fn with_options(options: StoreOptions) -> Self {
        let store = InMemoryStore::with_options(options);
        Self {
            coordinator: Arc::new(CheckoutCoordinator::new(store.clone())),
            lifecycle: OrderLifecycle::new(store.clone()),
            store,
        }
    }

    async fn product(&self, seller: i64, cents: i64, quantity: u32) -> ProductId {
        self.store
            .create_product(NewProduct::new(
                SellerId::new(seller),
                "Item",
                Money::from_cents(cents),
                quantity,
            ))
            .await
            .unwrap()
            .id
    }

    async fn stock(&self, product_id: ProductId) -> u32 {
        self.store.stock_levels().await[&product_id]
    }

    async fn place(&self, customer: i64, lines: &[(ProductId, u32)]) -> domain::Order {
        let mut cart = CartSnapshot::from_lines(lines.iter().copied()).unwrap();
        self.coordinator
            .checkout(CustomerId::new(customer), &mut cart)
            .await
            .unwrap()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 5).await;

    let mut handles = Vec::new();
    for customer in 0..20 {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            let mut cart = CartSnapshot::new();
            cart.add(p1, 1).unwrap();
            coordinator
                .checkout(CustomerId::new(customer), &mut cart)
                .await
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
    assert_eq!(h.store.order_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn last_unit_goes_to_exactly_one_customer() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 1).await;

    let race = |customer: i64| {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move {
            let mut cart = CartSnapshot::new();
            cart.add(p1, 1).unwrap();
            coordinator
                .checkout(CustomerId::new(customer), &mut cart)
                .await
        })
    };
    let (a, b) = tokio::join!(race(1), race(2));
    let results = [a.unwrap(), b.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(CheckoutError::InsufficientStock(id)) if *id == p1))
    );
    assert_eq!(h.stock(p1).await, 0);
}

#[tokio::test]
async fn oversized_request_changes_nothing() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 3).await;
    let mut cart = CartSnapshot::new();
    cart.add(p1, 5).unwrap();

    let err = h
        .coordinator
        .checkout(CustomerId::new(1), &mut cart)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::InsufficientStock(id) if id == p1));
    assert_eq!(h.stock(p1).await, 3);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(cart.len(), 1);
}

#[tokio::test]
async fn failed_checkout_leaves_no_partial_state() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 10).await;
    let p2 = h.product(1, 200, 10).await;
    let p3 = h.product(2, 300, 1).await;
    h.place(9, &[(p1, 1)]).await;

    let stock_before = h.store.stock_levels().await;
    let orders_before = h.store.query_orders(OrderQuery::new()).await.unwrap();

    // p1 and p2 pass validation before p3 fails.
    let mut cart = CartSnapshot::from_lines([(p1, 2), (p2, 2), (p3, 2)]).unwrap();
    let err = h
        .coordinator
        .checkout(CustomerId::new(1), &mut cart)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::InsufficientStock(id) if id == p3));
    assert_eq!(h.store.stock_levels().await, stock_before);
    assert_eq!(
        h.store.query_orders(OrderQuery::new()).await.unwrap(),
        orders_before
    );
}

#[tokio::test]
async fn total_uses_purchase_prices() {
    let h = TestHarness::new();
    let p1 = h.product(1, 1000, 10).await;
    let p2 = h.product(1, 500, 10).await;

    let order = h.place(1, &[(p1, 2), (p2, 1)]).await;
    assert_eq!(order.total, Money::from_cents(2500));
    assert_eq!(order.total.to_string(), "$25.00");

    h.store
        .update_product_price(p1, Money::from_cents(4200))
        .await
        .unwrap();

    let stored = h.lifecycle.get_order(order.id).await.unwrap();
    assert_eq!(stored.total, Money::from_cents(2500));
    let prices: Vec<_> = stored.items.iter().map(|i| (i.product_id, i.unit_price)).collect();
    assert_eq!(
        prices,
        vec![(p1, Money::from_cents(1000)), (p2, Money::from_cents(500))]
    );
}

#[tokio::test]
async fn cancel_restores_exactly_what_was_reserved() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 10).await;
    let p2 = h.product(1, 100, 10).await;
    let order = h.place(7, &[(p1, 2), (p2, 3)]).await;
    assert_eq!((h.stock(p1).await, h.stock(p2).await), (8, 7));

    // Stock moves independently before the cancel.
    h.place(8, &[(p1, 1)]).await;

    let reversal = h.lifecycle.cancel(order.id, CustomerId::new(7)).await.unwrap();

    assert_eq!(reversal.outcome, OrderStatus::Cancelled);
    assert_eq!(reversal.restored.len(), 2);
    assert_eq!(h.stock(p1).await, 9);
    assert_eq!(h.stock(p2).await, 10);
    assert!(h.store.get_order(order.id).await.unwrap().is_none());
}

#[tokio::test]
async fn second_cancel_is_not_found() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 5).await;
    let order = h.place(1, &[(p1, 2)]).await;

    h.lifecycle.cancel(order.id, CustomerId::new(1)).await.unwrap();
    assert_eq!(h.stock(p1).await, 5);

    let err = h
        .lifecycle
        .cancel(order.id, CustomerId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(id) if id == order.id));
    assert_eq!(h.stock(p1).await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_cancels_restore_once() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 5).await;
    let order = h.place(1, &[(p1, 3)]).await;
    let order_id = order.id;
    let lifecycle = Arc::new(OrderLifecycle::new(h.store.clone()));

    let cancel = || {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.cancel(order_id, CustomerId::new(1)).await })
    };
    let (a, b) = tokio::join!(cancel(), cancel());
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(LifecycleError::NotFound(_))))
    );
    assert_eq!(h.stock(p1).await, 5);
}

#[tokio::test]
async fn cancel_by_another_customer_is_refused() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 5).await;
    let order = h.place(1, &[(p1, 2)]).await;

    let err = h
        .lifecycle
        .cancel(order.id, CustomerId::new(2))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::NotOwner { .. }));
    assert_eq!(h.stock(p1).await, 3);
    assert!(h.store.get_order(order.id).await.unwrap().is_some());
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let h = TestHarness::new();
    let err = h
        .lifecycle
        .reject(OrderId::new(404), SellerId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));
}

#[tokio::test]
async fn reject_requires_an_owned_product() {
    let h = TestHarness::new();
    let mine = h.product(1, 100, 5).await;
    let theirs = h.product(2, 100, 5).await;
    let order = h.place(1, &[(mine, 1), (theirs, 2)]).await;

    let err = h
        .lifecycle
        .reject(order.id, SellerId::new(3))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotAuthorized { .. }));

    let reversal = h.lifecycle.reject(order.id, SellerId::new(1)).await.unwrap();
    assert_eq!(reversal.outcome, OrderStatus::Rejected);
    assert_eq!(h.stock(mine).await, 5);
    assert_eq!(h.stock(theirs).await, 5);
}

#[tokio::test]
async fn delivered_orders_cannot_be_reversed() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 5).await;
    let order = h.place(1, &[(p1, 2)]).await;

    let delivered = h
        .lifecycle
        .mark_delivered(order.id, SellerId::new(1))
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert_eq!(h.stock(p1).await, 3);

    let err = h
        .lifecycle
        .cancel(order.id, CustomerId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition(OrderError::InvalidStateTransition {
            current: OrderStatus::Delivered,
            ..
        })
    ));

    let err = h
        .lifecycle
        .mark_delivered(order.id, SellerId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition(_)));
    assert_eq!(h.stock(p1).await, 3);
}

#[tokio::test]
async fn blocked_checkout_surfaces_retryable_failure() {
    let h = TestHarness::with_options(StoreOptions::with_lock_timeout(Duration::from_millis(50)));
    let p1 = h.product(1, 100, 5).await;

    let mut holder = h.store.begin().await.unwrap();
    holder.lock_product(p1).await.unwrap();

    let mut cart = CartSnapshot::new();
    cart.add(p1, 1).unwrap();
    let err = h
        .coordinator
        .checkout(CustomerId::new(1), &mut cart)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::TransientFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(cart.len(), 1);

    holder.rollback().await.unwrap();

    // A retry after the lock is released goes through.
    h.coordinator
        .checkout(CustomerId::new(1), &mut cart)
        .await
        .unwrap();
    assert_eq!(h.stock(p1).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_carts_in_opposite_order_do_not_deadlock() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 100).await;
    let p2 = h.product(1, 100, 100).await;

    let mut handles = Vec::new();
    for n in 0..40 {
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

    let all = tokio::time::timeout(Duration::from_secs(10), async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    })
    .await;

    assert!(all.is_ok());
    assert_eq!(h.stock(p1).await, 60);
    assert_eq!(h.stock(p2).await, 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saved_cart_checkouts_place_one_order() {
    let h = TestHarness::new();
    let p1 = h.product(1, 100, 10).await;
    let customer = CustomerId::new(8);
    h.store
        .save_cart(customer, &CartSnapshot::from_lines([(p1, 2)]).unwrap())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
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
    assert_eq!(h.store.order_count().await, 1);
    assert!(h.store.load_cart(customer).await.unwrap().is_none());
}

#[tokio::test]
async fn listings_and_summaries() {
    let h = TestHarness::new();
    let p1 = h.product(1, 1000, 10).await;
    let p2 = h.product(2, 500, 10).await;
    let first = h.place(1, &[(p1, 1)]).await;
    let second = h.place(1, &[(p1, 1), (p2, 2)]).await;
    h.place(2, &[(p2, 1)]).await;
    h.lifecycle
        .mark_delivered(first.id, SellerId::new(1))
        .await
        .unwrap();

    let mine = h.lifecycle.orders_for_customer(CustomerId::new(1)).await.unwrap();
    assert_eq!(
        mine.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    let summary = h.lifecycle.customer_summary(CustomerId::new(1)).await.unwrap();
    assert_eq!(summary.total_orders, 2);
    assert_eq!(summary.pending_orders, 1);
    assert_eq!(summary.delivered_orders, 1);
    assert_eq!(summary.total_spent, Money::from_cents(3000));

    let seller_orders = h.lifecycle.orders_for_seller(SellerId::new(2)).await.unwrap();
    assert_eq!(seller_orders.len(), 2);

    let seller = h.lifecycle.seller_summary(SellerId::new(2)).await.unwrap();
    assert_eq!(seller.total_orders, 2);
    assert_eq!(seller.revenue, Money::from_cents(1500));
    assert_eq!(seller.units_sold, 3);
}
