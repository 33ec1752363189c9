//! Exchange gateway entry point.
//!
//! Sits between the participant portals and the auction exchange API.
//! Lifecycle and bid actions are validated locally and re-validated against
//! what the exchange returns; ledger reads are hash-chain verified before any
//! settlement data is served.

mod api;
mod auth;
mod client;
mod config;
mod errors;
mod orchestrator;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client::ExchangeClient;
use config::Config;
use orchestrator::Watermarks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    let client = ExchangeClient::new(&config).map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        "Forwarding to {} (timeout {:?}, {} read retries)",
        config.api_url,
        config.request_timeout(),
        config.read_retries
    );

    let api_state = Arc::new(api::ApiState {
        client,
        watermarks: Watermarks::default(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/rounds", get(api::round_history))
        .route("/rounds/current", get(api::current_round))
        .route("/rounds/open", post(api::open_round))
        .route("/rounds/close", post(api::close_round))
        .route("/rounds/lock", post(api::lock_round))
        .route("/bids/ask", post(api::submit_ask))
        .route("/bids/quote", post(api::submit_quote))
        .route("/bids/preferences", post(api::submit_preferences))
        .route("/bids/my-current", get(api::my_current_bid))
        .route("/ledger", get(api::ledger))
        .route("/ledger/verify", get(api::verify_ledger))
        .route("/matching/result", get(api::matching_result))
        .route("/settlement/result", get(api::settlement_result))
        .route("/projects/status", get(api::project_status))
        .route("/projects/phase", post(api::change_phase))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    // ─── Shutdown on Ctrl-C ───────────────────────────────
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
                return;
            }
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let addr = format!("0.0.0.0:{}", config.gateway_port);
    info!("Gateway listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
