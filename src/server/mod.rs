//! The HTTP layer: routes, handlers, error mapping and the response cache middleware.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    handler::Handler,
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

pub mod cache_layer;
mod error;
mod orders;
mod params;
mod products;
mod state;
mod users;

pub use cache_layer::{CachePolicy, X_CACHE};
pub use error::AppError;
pub use state::AppState;

use crate::seed::seed;
use crate::store::Store;
use crate::ServerConfig;

/// Builds the application router around `state`.
///
/// Serve it from the multi-threaded tokio runtime: handlers make blocking store calls, which
/// only move off the async workers there.
pub fn router(state: AppState) -> Router {
    let policy = CachePolicy::new(
        state.cache.clone(),
        state.config.cache_ttl,
        state.cache_keys.clone(),
    );
    let cached = from_fn_with_state(policy, cache_layer::cache_responses);

    let cors = CorsLayer::permissive().max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/users",
            get(users::list_users.layer(cached.clone())).post(users::create_user),
        )
        .route(
            "/api/users/{id}",
            get(users::get_user.layer(cached.clone()))
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/api/users/{id}/orders/latest",
            get(users::latest_order.layer(cached.clone())),
        )
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route(
            "/api/orders/{id}",
            get(orders::get_order)
                .put(orders::update_order)
                .delete(orders::delete_order),
        )
        .route(
            "/api/products",
            get(products::list_products.layer(cached.clone())).post(products::create_product),
        )
        .route(
            "/api/products/{id}",
            get(products::get_product.layer(cached))
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Hello from the pagebound backend!"
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!("Failed to encode metrics: {e}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Opens the store, seeds it if configured, and serves until Ctrl+C or SIGTERM.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    info!("Opening record store at {}", config.database_path.display());
    let store = Arc::new(Store::open(&config.database_path, &config.rocksdb)?);

    if config.seed_users + config.seed_products + config.seed_orders > 0 {
        let seed_store = store.clone();
        let (users, products, orders) =
            (config.seed_users, config.seed_products, config.seed_orders);
        let report =
            tokio::task::spawn_blocking(move || seed(&seed_store, users, products, orders))
                .await
                .context("Seeding task panicked")??;
        info!(?report, "Seeding finished");
    }

    let address = format!("0.0.0.0:{}", config.port);
    let app = router(AppState::new(store, config));

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
