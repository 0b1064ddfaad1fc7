//! HTTP adapter for the fulfillment core.
//!
//! Provides REST endpoints for order placement, administration and payment
//! notifications, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{MarkerError, OrderService, PaymentReconciler};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::NotificationHub;
use store::FulfillmentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub orders: OrderService<S, NotificationHub>,
    pub payments: PaymentReconciler<S, NotificationHub>,
    /// Fan-out point for order events. The HTTP surface has no push
    /// endpoint; a transport such as a websocket or SSE route subscribes
    /// here with [`NotificationHub::subscribe`].
    pub hub: NotificationHub,
}

impl<S: FulfillmentStore + Clone> AppState<S> {
    /// Wires the order and payment services to `store` and a fresh hub.
    pub fn new(store: S, config: &Config) -> Result<Self, MarkerError> {
        let hub = NotificationHub::new();
        Ok(Self {
            orders: OrderService::with_policy(store.clone(), hub.clone(), config.order_policy()),
            payments: PaymentReconciler::new(store, hub.clone(), config.reconciler_config())?,
            hub,
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: FulfillmentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/process", patch(routes::orders::process::<S>))
        .route("/orders/{id}/ship", patch(routes::orders::ship::<S>))
        .route("/orders/{id}/deliver", patch(routes::orders::deliver::<S>))
        .route("/orders/{id}/cancel", patch(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/confirm-delivery",
            patch(routes::orders::confirm_delivery::<S>),
        )
        .route("/users/me/orders", get(routes::orders::list_mine::<S>))
        .route(
            "/users/{user_id}/orders",
            get(routes::orders::list_for_user::<S>),
        )
        .route("/payments/webhook", post(routes::payments::webhook::<S>))
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
