//! HTTP API server with observability for the storefront.
//!
//! Provides REST endpoints for the catalog, session-bound carts, checkout,
//! customer authentication and order administration, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod session;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderName;
use axum::routing::{delete, get, post, put};
use domain::{CustomerError, DomainError, Registration};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use session::SESSION_HEADER;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Catalog
        .route(
            "/products",
            get(routes::catalog::search::<S>).post(routes::catalog::create_product::<S>),
        )
        .route("/products/featured", get(routes::catalog::featured::<S>))
        .route(
            "/products/{id}",
            get(routes::catalog::get::<S>)
                .patch(routes::catalog::update_product::<S>)
                .delete(routes::catalog::delete_product::<S>),
        )
        .route(
            "/brands",
            get(routes::catalog::list_brands::<S>).post(routes::catalog::create_brand::<S>),
        )
        .route(
            "/categories",
            get(routes::catalog::list_categories::<S>)
                .post(routes::catalog::create_category::<S>),
        )
        // Cart
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/add", post(routes::cart::add::<S>))
        .route("/cart/modify", put(routes::cart::modify::<S>))
        .route("/cart/remove/{product_id}", delete(routes::cart::remove::<S>))
        .route("/cart/clear", delete(routes::cart::clear::<S>))
        // Identity
        .route("/auth/register", post(routes::auth::register::<S>))
        .route("/auth/login", post(routes::auth::login::<S>))
        .route("/auth/logout", post(routes::auth::logout::<S>))
        // Orders
        .route("/checkout", post(routes::checkout::checkout::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/stats", get(routes::orders::stats::<S>))
        .route("/orders/bulk", post(routes::orders::bulk::<S>))
        .route("/orders/track/{token}", get(routes::orders::track::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/change-state",
            post(routes::orders::change_state::<S>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([HeaderName::from_static(SESSION_HEADER)]),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the shared state for `store`.
pub fn create_state<S: Store>(store: S, config: &Config) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, config))
}

/// Creates the configured staff account if it does not exist yet.
pub async fn bootstrap_admin<S: Store>(
    state: &AppState<S>,
    config: &Config,
) -> Result<(), DomainError> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    match state
        .customers
        .register_staff(Registration::new(email.as_str(), password.as_str()))
        .await
    {
        Ok(admin) => {
            tracing::info!(customer_id = %admin.id, "admin account created");
            Ok(())
        }
        Err(DomainError::Customer(CustomerError::DuplicateEmail(_))) => {
            tracing::info!("admin account already exists");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
