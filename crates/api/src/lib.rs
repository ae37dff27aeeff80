//! HTTP API server with observability for the storefront order core.
//!
//! Provides JSON endpoints for products, checkout, order lifecycle and saved
//! carts, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{CheckoutCoordinator, OrderLifecycle};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub checkout: CheckoutCoordinator<S>,
    pub lifecycle: OrderLifecycle<S>,
}

impl<S: Store + Clone> AppState<S> {
    /// Creates the application state around one store.
    pub fn new(store: S) -> Self {
        Self {
            checkout: CheckoutCoordinator::new(store.clone()),
            lifecycle: OrderLifecycle::new(store.clone()),
            store,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", post(routes::products::create::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route(
            "/products/{id}/price",
            put(routes::products::update_price::<S>),
        )
        .route("/checkout", post(routes::orders::checkout::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/reject", post(routes::orders::reject::<S>))
        .route("/orders/{id}/deliver", post(routes::orders::deliver::<S>))
        .route(
            "/customers/{id}/orders",
            get(routes::orders::for_customer::<S>),
        )
        .route(
            "/customers/{id}/summary",
            get(routes::orders::customer_summary::<S>),
        )
        .route("/sellers/{id}/orders", get(routes::orders::for_seller::<S>))
        .route(
            "/sellers/{id}/summary",
            get(routes::orders::seller_summary::<S>),
        )
        .route(
            "/customers/{id}/cart",
            get(routes::carts::get::<S>)
                .put(routes::carts::save::<S>)
                .delete(routes::carts::delete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Registers descriptions for the metrics emitted by the order core.
pub fn describe_metrics() {
    metrics::describe_counter!("checkout_attempts_total", "Checkouts started");
    metrics::describe_counter!("checkout_completed_total", "Checkouts committed");
    metrics::describe_counter!(
        "checkout_failed_total",
        "Checkouts rolled back, labelled by reason"
    );
    metrics::describe_counter!(
        "order_reversals_total",
        "Committed cancels and rejects, labelled by outcome"
    );
    metrics::describe_histogram!(
        "checkout_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of a checkout attempt"
    );
}
