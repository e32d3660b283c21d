//! Passgate Server - REST API for the passkey-gated wallet
//!
//! Exposes passgate-core ceremonies via HTTP endpoints:
//! - POST /auth/register/{begin,complete} - Enroll a passkey
//! - POST /auth/login/{begin,complete} - Authenticate
//! - POST /wallet/{deposit,transfer}/{begin,complete} - Step-up gated money movement
//! - GET /wallet/{username}/{balance,transactions} - Account reads
//! - GET /health - Health check

use std::time::Duration;

use passgate_server::{create_router_with_state, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("passgate_server=info,passgate_core=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    if let Err(reason) = config.validate() {
        // Browsers will refuse ceremonies under a mismatched RP config, but
        // the server itself can still run; make the problem loud.
        tracing::error!(%reason, "relying party configuration is inconsistent");
    }
    tracing::info!(
        rp_id = %config.rp_id,
        rp_origin = %config.rp_origin,
        "starting passgate-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let state = AppState::from_config(&config);

    // Reap expired challenges and parked operations in the background.
    // Expiry is also enforced at use time; this only bounds memory.
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let challenges = sweeper.engine.challenges().sweep();
            let operations = sweeper.coordinator.sweep();
            if challenges > 0 || operations > 0 {
                tracing::debug!(challenges, operations, "swept expired entries");
            }
        }
    });

    let app = create_router_with_state(&config, state);
    let addr = config.socket_addr();
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app)
        .await
        .expect("server error");
}
