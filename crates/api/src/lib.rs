//! HTTP API server with observability for the shop.
//!
//! Provides REST endpoints for accounts, the catalog, carts and orders,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{auth, cart, orders, products};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/auth/register", post(auth::register::<S>))
        .route("/auth/login", post(auth::login::<S>))
        .route("/auth/me", get(auth::me::<S>))
        .route(
            "/products",
            get(products::list::<S>).post(products::create::<S>),
        )
        .route("/products/search", get(products::search::<S>))
        .route(
            "/products/category/{category}",
            get(products::by_category::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .patch(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route("/products/{id}/stock", post(products::adjust_stock::<S>))
        .route("/cart", get(cart::get::<S>).delete(cart::clear::<S>))
        .route("/cart/summary", get(cart::summary::<S>))
        .route("/cart/validate", get(cart::validate::<S>))
        .route("/cart/items", post(cart::add_item::<S>))
        .route(
            "/cart/items/{id}",
            patch(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route("/cart/merge", post(cart::merge::<S>))
        .route("/cart/checkout", post(cart::checkout::<S>))
        .route("/orders", get(orders::list::<S>).post(orders::create::<S>))
        .route("/orders/stats", get(orders::stats::<S>))
        .route(
            "/orders/{id}",
            get(orders::get::<S>).patch(orders::update::<S>),
        )
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/orders/{id}/status", put(orders::set_status::<S>))
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
