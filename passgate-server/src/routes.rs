//! Router configuration module
//!
//! Configures all routes, middleware layers, and creates the application router.

use std::time::Duration;

use axum::{
    http::{header, Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::{auth, health, wallet};
use crate::state::AppState;

/// Create the application router with default config (for testing)
pub fn create_router() -> Router {
    let config = Config::default();
    create_router_with_state(&config, AppState::from_config(&config))
}

/// Create the application router with custom configuration
pub fn create_router_with_config(config: &Config) -> Router {
    create_router_with_state(config, AppState::from_config(config))
}

/// Create the application router over pre-built state
pub fn create_router_with_state(config: &Config, state: AppState) -> Router {
    // Configure CORS based on allowed_origins
    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS: Restricting to {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        }
        _ => {
            tracing::warn!("CORS: Allowing all origins (dev mode)");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    // Ceremony payloads are small; keep the body limit tight
    let body_limit = RequestBodyLimitLayer::new(config.body_limit_kb * 1024);

    // Request timeout
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    Router::new()
        .route("/auth/register/begin", post(auth::register_begin))
        .route("/auth/register/complete", post(auth::register_complete))
        .route("/auth/login/begin", post(auth::login_begin))
        .route("/auth/login/complete", post(auth::login_complete))
        .route("/wallet/deposit/begin", post(wallet::deposit_begin))
        .route("/wallet/deposit/complete", post(wallet::deposit_complete))
        .route("/wallet/transfer/begin", post(wallet::transfer_begin))
        .route("/wallet/transfer/complete", post(wallet::transfer_complete))
        .route("/wallet/{username}/balance", get(wallet::balance))
        .route("/wallet/{username}/transactions", get(wallet::transactions))
        .route("/health", get(health::health))
        .layer(cors)
        .layer(body_limit)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
