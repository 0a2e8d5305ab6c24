//! HTTP API server with observability for the storefront.
//!
//! Provides REST endpoints for the catalog, guest carts, promo codes and
//! orders, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use checkout::CheckoutCoordinator;
use domain::{CartService, CatalogService, OrderService, PromotionService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::DocumentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: DocumentStore> {
    pub catalog: CatalogService<S>,
    pub carts: CartService<S>,
    pub promotions: PromotionService<S>,
    pub orders: OrderService<S>,
    pub checkout: CheckoutCoordinator<S>,
}

impl<S: DocumentStore + Clone> AppState<S> {
    /// Wires every service over one store. Carts and checkout share locks.
    pub fn new(store: S, cart_ttl: chrono::Duration) -> Self {
        let carts = CartService::new(store.clone(), cart_ttl);
        Self {
            catalog: CatalogService::new(store.clone()),
            promotions: PromotionService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            checkout: CheckoutCoordinator::new(store, carts.clone()),
            carts,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DocumentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{cart, orders, products, promos};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/products",
            post(products::create::<S>).get(products::list::<S>),
        )
        .route("/products/categories", get(products::categories::<S>))
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .put(products::update::<S>)
                .delete(products::deactivate::<S>),
        )
        .route("/cart", post(cart::create::<S>))
        .route("/cart/{guest_token}", get(cart::get::<S>))
        .route("/cart/{guest_token}/items", post(cart::add_item::<S>))
        .route(
            "/cart/{guest_token}/items/{product_id}/{variant_id}",
            put(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route("/cart/{guest_token}/clear", delete(cart::clear::<S>))
        .route("/promos", post(promos::create::<S>).get(promos::list::<S>))
        .route("/promos/{guest_token}/validate", post(promos::validate::<S>))
        .route("/promos/{guest_token}/apply", post(promos::apply::<S>))
        .route("/promos/{guest_token}/remove", delete(promos::remove::<S>))
        .route("/orders", get(orders::list::<S>))
        .route("/orders/guest/{guest_token}", get(orders::list_for_guest::<S>))
        .route(
            "/orders/{id}",
            post(orders::create::<S>).get(orders::get::<S>),
        )
        .route("/orders/{id}/status", put(orders::update_status::<S>))
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
