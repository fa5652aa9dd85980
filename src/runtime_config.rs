// =============================================================================
// Runtime Configuration — service settings with atomic save
// =============================================================================
//
// Every tunable parameter of the watchlist service lives here: the seed
// ticker list, indicator parameters, fetch look-back and cache TTL, and the
// bind address of the HTTP shell.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indicators::DEFAULT_PERIOD;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "rsi_watch.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_seed_tickers() -> String {
    "TL0.TG,APC.TG".to_string()
}

fn default_watchlist_path() -> String {
    "watchlist.json".to_string()
}

fn default_rsi_period() -> usize {
    DEFAULT_PERIOD
}

fn default_lookback_days() -> u32 {
    180
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Watchlist ----------------------------------------------------------

    /// Comma-separated tickers used on first run and on reset.
    #[serde(default = "default_seed_tickers")]
    pub seed_tickers: String,

    /// JSON file holding the persisted watchlist.
    #[serde(default = "default_watchlist_path")]
    pub watchlist_path: String,

    /// Keep the watchlist in process memory only; `watchlist_path` is ignored.
    #[serde(default)]
    pub ephemeral: bool,

    // --- Indicator ----------------------------------------------------------

    /// RSI look-back window.
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Optional second, shorter RSI window (e.g. 5) shown next to the main one.
    #[serde(default)]
    pub fast_rsi_period: Option<usize>,

    /// RSI strictly below this is the buy zone.
    #[serde(default = "default_oversold")]
    pub oversold: f64,

    /// RSI strictly above this is the sell zone.
    #[serde(default = "default_overbought")]
    pub overbought: f64,

    // --- Market data --------------------------------------------------------

    /// Calendar days of daily history requested per ticker.  Must comfortably
    /// exceed `rsi_period` to survive weekends and holidays.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// How long a fetched batch is reused before hitting the provider again.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    // --- HTTP ---------------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed_tickers: default_seed_tickers(),
            watchlist_path: default_watchlist_path(),
            ephemeral: false,
            rsi_period: default_rsi_period(),
            fast_rsi_period: None,
            oversold: default_oversold(),
            overbought: default_overbought(),
            lookback_days: default_lookback_days(),
            cache_ttl_secs: default_cache_ttl_secs(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            seed_tickers = %config.seed_tickers,
            rsi_period = config.rsi_period,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `RSI_WATCH_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(seed) = lookup("RSI_WATCH_SEED_TICKERS") {
            self.seed_tickers = seed;
        }
        if let Some(addr) = lookup("RSI_WATCH_BIND_ADDR").filter(|s| !s.trim().is_empty()) {
            self.bind_addr = addr;
        }
        if let Some(path) = lookup("RSI_WATCH_WATCHLIST_PATH").filter(|s| !s.trim().is_empty()) {
            self.watchlist_path = path;
        }
        if let Some(flag) = lookup("RSI_WATCH_EPHEMERAL") {
            self.ephemeral = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Clamp values that would make the indicator meaningless.
    pub fn sanitise(&mut self) {
        if self.rsi_period == 0 {
            warn!("rsi_period of 0 is invalid, using default");
            self.rsi_period = default_rsi_period();
        }
        if self.fast_rsi_period == Some(0) {
            warn!("fast_rsi_period of 0 is invalid, disabling");
            self.fast_rsi_period = None;
        }
        let min_lookback = u32::try_from(self.rsi_period)
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        if self.lookback_days < min_lookback {
            warn!(
                lookback_days = self.lookback_days,
                min = min_lookback,
                "lookback_days shorter than the RSI window, raising"
            );
            self.lookback_days = min_lookback;
        }
        if self.oversold > self.overbought {
            warn!(
                oversold = self.oversold,
                overbought = self.overbought,
                "oversold above overbought, restoring defaults"
            );
            self.oversold = default_oversold();
            self.overbought = default_overbought();
        }
    }
}
