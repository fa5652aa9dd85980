// =============================================================================
// RSI Watch — Main Entry Point
// =============================================================================
//
// Loads the runtime config, restores (or seeds) the watchlist and serves the
// JSON API that a dashboard front-end renders its ticker cards from.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod dashboard;
mod indicators;
mod market_data;
mod runtime_config;
mod types;
mod watchlist;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::YahooClient;
use crate::runtime_config::{RuntimeConfig, DEFAULT_CONFIG_PATH};
use crate::watchlist::open_backend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("RSI Watch starting up");

    let config_path =
        std::env::var("RSI_WATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides();
    config.sanitise();

    info!(
        seed = %config.seed_tickers,
        rsi_period = config.rsi_period,
        fast_rsi_period = ?config.fast_rsi_period,
        lookback_days = config.lookback_days,
        cache_ttl_secs = config.cache_ttl_secs,
        ephemeral = config.ephemeral,
        "Configuration resolved"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let backend = open_backend(&config);
    let provider = Arc::new(YahooClient::new()?);
    let bind_addr = config.bind_addr.clone();

    // ── 3. Build shared state (loads or seeds the watchlist) ─────────────
    let state = Arc::new(AppState::new(config, backend, provider));
    {
        let view = state.watchlist_view();
        info!(
            tickers = ?view.tickers.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            persistence = ?view.persistence,
            "Watchlist ready"
        );
    }

    // ── 4. Serve the API ─────────────────────────────────────────────────
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    if let Err(e) = state.runtime_config.read().save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("RSI Watch shut down complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    warn!("Shutdown signal received — stopping gracefully");
}
