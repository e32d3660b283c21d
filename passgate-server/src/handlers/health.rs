//! Health check handler
//!
//! Provides a health endpoint for monitoring and orchestration.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Server version from Cargo.toml
    pub version: &'static str,
    /// Service name
    pub service: &'static str,
    /// Registered users
    pub users: usize,
    /// Step-up operations currently parked
    pub pending_operations: usize,
}

/// GET /health - Health check endpoint
///
/// Returns JSON with service status and a few gauge-level counters.
/// Used for monitoring and load balancer health checks.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "passgate-server",
        users: state.users.len(),
        pending_operations: state.coordinator.pending_count(),
    })
}
