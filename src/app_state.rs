// =============================================================================
// Central Application State — RSI Watchlist Service
// =============================================================================
//
// Ties the watchlist store, the cached market-data provider and the runtime
// configuration together and is handed to every HTTP handler as
// `Arc<AppState>`.  Nothing here is global: `main` builds exactly one.
//
// Thread safety:
//   - parking_lot::RwLock for the runtime config and the error log.
//   - parking_lot::Mutex around the watchlist store (one writer at a time).
//   - Atomic counter for lock-free version tracking.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};

use crate::dashboard::{build_dashboard, DashboardSettings, TickerReport};
use crate::market_data::{CachedProvider, MarketDataProvider};
use crate::runtime_config::RuntimeConfig;
use crate::types::Ticker;
use crate::watchlist::{PersistenceStatus, WatchlistBackend, WatchlistStore};

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable error message.
    pub message: String,
    /// Ticker the error relates to, if any.
    pub ticker: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Watchlist contents plus whether they are being persisted.
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistView {
    pub tickers: Vec<Ticker>,
    pub persistence: PersistenceStatus,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

pub type SharedWatchlist = WatchlistStore<Box<dyn WatchlistBackend>>;

/// Central application state shared across handlers via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, bumped on every watchlist
    /// mutation and every recorded error.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    pub watchlist: Mutex<SharedWatchlist>,

    pub provider: CachedProvider,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Last failure reason logged per ticker; cleared once it renders again.
    reported_failures: Mutex<BTreeMap<Ticker, String>>,

    /// Instant when the service was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the state and load the watchlist (seeding it on first run).
    pub fn new(
        config: RuntimeConfig,
        backend: Box<dyn WatchlistBackend>,
        provider: Arc<dyn MarketDataProvider>,
    ) -> Self {
        let mut store = WatchlistStore::new(backend, config.seed_tickers.clone());
        store.load();
        let provider = CachedProvider::new(provider, Duration::from_secs(config.cache_ttl_secs));

        let state = Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            watchlist: Mutex::new(store),
            provider,
            recent_errors: RwLock::new(Vec::new()),
            reported_failures: Mutex::new(BTreeMap::new()),
            start_time: std::time::Instant::now(),
        };
        state.note_persistence_status();
        state
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. The log is capped at [`MAX_RECENT_ERRORS`];
    /// oldest entries are evicted when the limit is reached.
    pub fn push_error(&self, msg: String) {
        self.push_error_for(msg, None);
    }

    pub fn push_error_for(&self, msg: String, ticker: Option<&Ticker>) {
        let record = ErrorRecord {
            message: msg,
            ticker: ticker.map(|t| t.to_string()),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Watchlist ───────────────────────────────────────────────────────

    pub fn watchlist_view(&self) -> WatchlistView {
        let store = self.watchlist.lock();
        WatchlistView {
            tickers: store.tickers().to_vec(),
            persistence: store.status().clone(),
        }
    }

    /// Add `ticker`; a fresh ticker invalidates the fetch cache.
    pub fn add_ticker(&self, ticker: Ticker) -> bool {
        let changed = self.watchlist.lock().add(ticker);
        if changed {
            self.provider.invalidate();
            self.after_mutation();
        }
        changed
    }

    pub fn remove_ticker(&self, ticker: &Ticker) -> bool {
        let changed = self.watchlist.lock().remove(ticker);
        if changed {
            self.after_mutation();
        }
        changed
    }

    /// Reset to the configured seed; always invalidates the fetch cache.
    pub fn reset_watchlist(&self) -> Vec<Ticker> {
        let seed = self.runtime_config.read().seed_tickers.clone();
        let tickers = {
            let mut store = self.watchlist.lock();
            store.set_seed(seed);
            store.reset_to_seed().to_vec()
        };
        self.provider.invalidate();
        self.after_mutation();
        tickers
    }

    // ── Dashboard ───────────────────────────────────────────────────────

    /// Run one dashboard pass over the current watchlist.  A ticker failure
    /// is recorded in the error log only when it is new or its reason changed,
    /// so polling a persistently broken ticker neither floods the log nor
    /// bumps the state version.
    pub async fn dashboard(&self) -> Vec<TickerReport> {
        let tickers = self.watchlist.lock().tickers().to_vec();
        let settings = DashboardSettings::from(&*self.runtime_config.read());

        let reports = build_dashboard(&tickers, &self.provider, &settings).await;

        let mut fresh_failures = Vec::new();
        {
            let mut reported = self.reported_failures.lock();
            reported.retain(|ticker, _| tickers.contains(ticker));
            for report in &reports {
                match report.error() {
                    Some(reason) => {
                        if reported.get(&report.ticker).map(String::as_str) != Some(reason) {
                            reported.insert(report.ticker.clone(), reason.to_string());
                            fresh_failures.push((report.ticker.clone(), reason.to_string()));
                        }
                    }
                    None => {
                        reported.remove(&report.ticker);
                    }
                }
            }
        }
        for (ticker, reason) in fresh_failures {
            self.push_error_for(format!("fetch failed: {reason}"), Some(&ticker));
        }

        debug!(
            rendered = reports.iter().filter(|r| r.card().is_some()).count(),
            total = reports.len(),
            "dashboard pass complete"
        );
        reports
    }

    /// Drop cached market data so the next dashboard pass refetches.
    pub fn refresh(&self) {
        self.provider.invalidate();
        self.increment_version();
    }

    // ── Internal helpers ────────────────────────────────────────────────

    fn after_mutation(&self) {
        self.increment_version();
        self.note_persistence_status();
    }

    /// Surface a persistence downgrade in the error log, once.
    fn note_persistence_status(&self) {
        let status = self.watchlist.lock().status().clone();
        if let PersistenceStatus::InMemory { reason } = status {
            let already_logged = self
                .recent_errors
                .read()
                .iter()
                .any(|e| e.message.starts_with("watchlist persistence"));
            if !already_logged {
                warn!(reason = %reason, "watchlist running in memory only");
                self.push_error(format!("watchlist persistence unavailable: {reason}"));
            }
        }
    }
}
