// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Every handler delegates to
// `AppState` and serialises the result as JSON.
//
// CORS is configured permissively so a static front-end can be served from
// any origin.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::{AppState, WatchlistView};
use crate::types::Ticker;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/watchlist", get(watchlist).post(add_ticker))
        .route("/api/v1/watchlist/reset", post(reset_watchlist))
        .route("/api/v1/watchlist/:ticker", delete(remove_ticker))
        .route("/api/v1/dashboard", get(dashboard))
        .route("/api/v1/refresh", post(refresh))
        .route("/api/v1/errors", get(errors))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// =============================================================================
// Watchlist
// =============================================================================

#[derive(Serialize)]
struct MutationResponse {
    changed: bool,
    #[serde(flatten)]
    watchlist: WatchlistView,
}

#[derive(Deserialize)]
struct AddTickerRequest {
    ticker: String,
}

fn bad_request(message: String) -> axum::response::Response {
    let body = serde_json::json!({ "error": message });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

async fn watchlist(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.watchlist_view())
}

async fn add_ticker(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTickerRequest>,
) -> axum::response::Response {
    let ticker = match Ticker::parse(&req.ticker) {
        Ok(t) => t,
        Err(e) => return bad_request(e.to_string()),
    };

    let changed = state.add_ticker(ticker.clone());
    if changed {
        info!(ticker = %ticker, "ticker added via API");
    }

    Json(MutationResponse {
        changed,
        watchlist: state.watchlist_view(),
    })
    .into_response()
}

async fn remove_ticker(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> axum::response::Response {
    let ticker = match Ticker::parse(&raw) {
        Ok(t) => t,
        Err(e) => return bad_request(e.to_string()),
    };

    let changed = state.remove_ticker(&ticker);
    if changed {
        info!(ticker = %ticker, "ticker removed via API");
    }

    Json(MutationResponse {
        changed,
        watchlist: state.watchlist_view(),
    })
    .into_response()
}

async fn reset_watchlist(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tickers = state.reset_watchlist();
    info!(count = tickers.len(), "watchlist reset via API");

    Json(MutationResponse {
        changed: true,
        watchlist: state.watchlist_view(),
    })
}

// =============================================================================
// Dashboard & market data
// =============================================================================

async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let reports = state.dashboard().await;
    let body = serde_json::json!({
        "state_version": state.current_state_version(),
        "reports": reports,
    });
    Json(body)
}

async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.refresh();
    info!("market data cache cleared via API");
    StatusCode::NO_CONTENT
}

async fn errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let errors = state.recent_errors.read().clone();
    Json(errors)
}
