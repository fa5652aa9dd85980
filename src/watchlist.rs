// =============================================================================
// Watchlist Store — persisted, duplicate-free ticker set
// =============================================================================
//
// The store owns the authoritative list of tracked tickers and writes it back
// to its backend after every mutation.  Insertion order is kept so cards
// render in the order the user added them.
//
// A backend failure never takes the service down: the store logs a warning,
// switches to in-memory operation for the rest of the session and reports
// the reason through `status()`.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::runtime_config::RuntimeConfig;
use crate::types::Ticker;

// =============================================================================
// Seed parsing
// =============================================================================

/// Parse a comma-separated seed list such as `"AAPL, TSLA"`.
///
/// Blank items are skipped and later duplicates are dropped; order is kept.
pub fn parse_seed(raw: &str) -> Vec<Ticker> {
    let mut tickers: Vec<Ticker> = Vec::new();
    for t in raw.split(',').filter_map(|s| Ticker::parse(s).ok()) {
        if !tickers.contains(&t) {
            tickers.push(t);
        }
    }
    tickers
}

// =============================================================================
// Backends
// =============================================================================

/// Durable key-set storage behind the store.
pub trait WatchlistBackend: Send {
    /// Return the persisted tickers, or `None` if nothing was ever written.
    fn read_all(&self) -> Result<Option<Vec<Ticker>>>;

    /// Replace the persisted tickers with `tickers`.
    fn write_all(&self, tickers: &[Ticker]) -> Result<()>;
}

impl<B: WatchlistBackend + ?Sized + Sync> WatchlistBackend for Arc<B> {
    fn read_all(&self) -> Result<Option<Vec<Ticker>>> {
        (**self).read_all()
    }

    fn write_all(&self, tickers: &[Ticker]) -> Result<()> {
        (**self).write_all(tickers)
    }
}

impl WatchlistBackend for Box<dyn WatchlistBackend> {
    fn read_all(&self) -> Result<Option<Vec<Ticker>>> {
        (**self).read_all()
    }

    fn write_all(&self, tickers: &[Ticker]) -> Result<()> {
        (**self).write_all(tickers)
    }
}

/// JSON array of ticker strings on disk.
///
/// Writes go to a `.tmp` sibling first and are renamed into place so a crash
/// mid-write never leaves a truncated file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WatchlistBackend for JsonFileBackend {
    fn read_all(&self) -> Result<Option<Vec<Ticker>>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read watchlist from {}", self.path.display())
                })
            }
        };

        let raw: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse watchlist from {}", self.path.display()))?;

        // One bad entry must not cost the user the rest of the list.
        let tickers = raw
            .into_iter()
            .filter_map(|entry| match Ticker::parse(&entry) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(path = %self.path.display(), entry = %entry, error = %e, "dropping invalid watchlist entry");
                    None
                }
            })
            .collect();

        Ok(Some(tickers))
    }

    fn write_all(&self, tickers: &[Ticker]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let content =
            serde_json::to_string_pretty(tickers).context("failed to serialise watchlist")?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp watchlist to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp watchlist to {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = tickers.len(), "watchlist saved (atomic)");
        Ok(())
    }
}

/// Process-local backend, used when the service runs with an ephemeral
/// watchlist.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    stored: Mutex<Option<Vec<Ticker>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_tickers(tickers: Vec<Ticker>) -> Self {
        Self {
            stored: Mutex::new(Some(tickers)),
        }
    }

    /// Current persisted contents.
    #[cfg(test)]
    pub fn stored(&self) -> Option<Vec<Ticker>> {
        self.stored.lock().clone()
    }
}

impl WatchlistBackend for MemoryBackend {
    fn read_all(&self) -> Result<Option<Vec<Ticker>>> {
        Ok(self.stored.lock().clone())
    }

    fn write_all(&self, tickers: &[Ticker]) -> Result<()> {
        *self.stored.lock() = Some(tickers.to_vec());
        Ok(())
    }
}

/// Pick the backend `config` asks for: process memory when `ephemeral` is
/// set, otherwise the JSON file at `watchlist_path`.
pub fn open_backend(config: &RuntimeConfig) -> Box<dyn WatchlistBackend> {
    if config.ephemeral {
        info!("watchlist is ephemeral, changes will not survive a restart");
        Box::new(MemoryBackend::new())
    } else {
        info!(path = %config.watchlist_path, "watchlist backed by JSON file");
        Box::new(JsonFileBackend::new(&config.watchlist_path))
    }
}

// =============================================================================
// WatchlistStore
// =============================================================================

/// Whether mutations are reaching the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PersistenceStatus {
    Durable,
    /// The backend failed; changes live only in this process.
    InMemory { reason: String },
}

pub struct WatchlistStore<B> {
    backend: B,
    seed: String,
    tickers: Vec<Ticker>,
    status: PersistenceStatus,
}

impl<B: WatchlistBackend> WatchlistStore<B> {
    /// Create an empty, not yet loaded store.  `seed` is the comma-separated
    /// default list used on first run and on reset.
    pub fn new(backend: B, seed: impl Into<String>) -> Self {
        Self {
            backend,
            seed: seed.into(),
            tickers: Vec::new(),
            status: PersistenceStatus::Durable,
        }
    }

    /// Load the persisted set, seeding (and persisting) it when nothing has
    /// been stored yet.
    pub fn load(&mut self) -> &[Ticker] {
        if let PersistenceStatus::InMemory { .. } = self.status {
            return &self.tickers;
        }

        match self.backend.read_all() {
            Ok(Some(stored)) => {
                self.tickers.clear();
                for t in stored {
                    if !self.tickers.contains(&t) {
                        self.tickers.push(t);
                    }
                }
                info!(count = self.tickers.len(), "watchlist loaded");
            }
            Ok(None) => {
                self.tickers = parse_seed(&self.seed);
                info!(count = self.tickers.len(), "no stored watchlist, seeding from config");
                self.persist();
            }
            Err(e) => {
                self.tickers = parse_seed(&self.seed);
                self.degrade(&e);
            }
        }

        &self.tickers
    }

    /// Insert `ticker`; returns `false` when it was already present.
    pub fn add(&mut self, ticker: Ticker) -> bool {
        if self.tickers.contains(&ticker) {
            debug!(ticker = %ticker, "add ignored, already tracked");
            return false;
        }
        info!(ticker = %ticker, "ticker added to watchlist");
        self.tickers.push(ticker);
        self.persist();
        true
    }

    /// Remove `ticker`; returns `false` when it was not present.
    pub fn remove(&mut self, ticker: &Ticker) -> bool {
        let before = self.tickers.len();
        self.tickers.retain(|t| t != ticker);
        if self.tickers.len() == before {
            debug!(ticker = %ticker, "remove ignored, not tracked");
            return false;
        }
        info!(ticker = %ticker, "ticker removed from watchlist");
        self.persist();
        true
    }

    /// Discard the current list and reload it from the seed configuration.
    pub fn reset_to_seed(&mut self) -> &[Ticker] {
        self.tickers = parse_seed(&self.seed);
        info!(count = self.tickers.len(), "watchlist reset to seed");
        self.persist();
        &self.tickers
    }

    /// Replace the seed used by subsequent resets.
    pub fn set_seed(&mut self, seed: impl Into<String>) {
        self.seed = seed.into();
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn status(&self) -> &PersistenceStatus {
        &self.status
    }

    #[cfg(test)]
    fn backend(&self) -> &B {
        &self.backend
    }

    // ── Internal helpers ────────────────────────────────────────────────

    fn persist(&mut self) {
        if let PersistenceStatus::InMemory { .. } = self.status {
            return;
        }
        if let Err(e) = self.backend.write_all(&self.tickers) {
            self.degrade(&e);
        }
    }

    fn degrade(&mut self, err: &anyhow::Error) {
        warn!(error = %format!("{err:#}"), "watchlist persistence failed, continuing in memory");
        self.status = PersistenceStatus::InMemory {
            reason: format!("{err:#}"),
        };
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn t(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    fn set(tickers: &[Ticker]) -> BTreeSet<Ticker> {
        tickers.iter().cloned().collect()
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("rsi-watch-{}", uuid::Uuid::new_v4()))
            .join("watchlist.json")
    }

    /// Backend whose every call fails.
    struct BrokenBackend;

    impl WatchlistBackend for BrokenBackend {
        fn read_all(&self) -> Result<Option<Vec<Ticker>>> {
            anyhow::bail!("table unavailable")
        }

        fn write_all(&self, _tickers: &[Ticker]) -> Result<()> {
            anyhow::bail!("table unavailable")
        }
    }

    /// Reads fine, refuses writes.
    struct ReadOnlyBackend(Vec<Ticker>);

    impl WatchlistBackend for ReadOnlyBackend {
        fn read_all(&self) -> Result<Option<Vec<Ticker>>> {
            Ok(Some(self.0.clone()))
        }

        fn write_all(&self, _tickers: &[Ticker]) -> Result<()> {
            anyhow::bail!("read-only filesystem")
        }
    }

    // ---- parse_seed ------------------------------------------------------

    #[test]
    fn seed_parsing_trims_and_dedups() {
        assert_eq!(parse_seed("AAPL, TSLA,,AAPL , "), vec![t("AAPL"), t("TSLA")]);
        assert!(parse_seed("").is_empty());
        assert!(parse_seed(" , ,").is_empty());
    }

    // ---- load ------------------------------------------------------------

    #[test]
    fn first_load_seeds_and_persists() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = WatchlistStore::new(backend.clone(), "AAPL,TSLA");

        let loaded = set(store.load());

        assert_eq!(loaded, set(&[t("AAPL"), t("TSLA")]));
        assert_eq!(backend.stored(), Some(vec![t("AAPL"), t("TSLA")]));
        assert_eq!(store.status(), &PersistenceStatus::Durable);
    }

    #[test]
    fn load_prefers_persisted_state() {
        let backend = MemoryBackend::with_tickers(vec![t("MSFT")]);
        let mut store = WatchlistStore::new(backend, "AAPL,TSLA");
        assert_eq!(store.load(), &[t("MSFT")]);
    }

    #[test]
    fn persisted_empty_list_stays_empty() {
        let backend = MemoryBackend::with_tickers(Vec::new());
        let mut store = WatchlistStore::new(backend, "AAPL,TSLA");
        assert!(store.load().is_empty());
    }

    // ---- add / remove ----------------------------------------------------

    #[test]
    fn add_then_remove_persists_result() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = WatchlistStore::new(backend.clone(), "AAPL,TSLA");
        store.load();

        assert!(store.add(t("MSFT")));
        assert!(store.remove(&t("AAPL")));

        let persisted = backend.stored().unwrap();
        assert_eq!(set(&persisted), set(&[t("TSLA"), t("MSFT")]));
        assert_eq!(store.tickers(), persisted.as_slice());
    }

    #[test]
    fn add_is_idempotent() {
        let mut once = WatchlistStore::new(MemoryBackend::new(), "AAPL");
        once.load();
        once.add(t("MSFT"));

        let mut twice = WatchlistStore::new(MemoryBackend::new(), "AAPL");
        twice.load();
        assert!(twice.add(t("MSFT")));
        assert!(!twice.add(t("MSFT")));

        assert_eq!(once.tickers(), twice.tickers());
        assert_eq!(once.backend().stored(), twice.backend().stored());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = WatchlistStore::new(MemoryBackend::new(), "AAPL,TSLA");
        store.load();
        assert!(store.remove(&t("AAPL")));
        let after_first = store.tickers().to_vec();
        assert!(!store.remove(&t("AAPL")));
        assert_eq!(store.tickers(), after_first.as_slice());
        assert_eq!(store.backend().stored(), Some(after_first));
    }

    #[test]
    fn no_duplicates_from_duplicated_storage() {
        let backend = MemoryBackend::with_tickers(vec![t("AAPL"), t("AAPL"), t("TSLA")]);
        let mut store = WatchlistStore::new(backend, "");
        assert_eq!(store.load(), &[t("AAPL"), t("TSLA")]);
    }

    // ---- reset_to_seed ---------------------------------------------------

    #[test]
    fn reset_restores_seed() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = WatchlistStore::new(backend.clone(), "AAPL,TSLA");
        store.load();
        store.add(t("MSFT"));
        store.remove(&t("AAPL"));

        let reset = set(store.reset_to_seed());

        assert_eq!(reset, set(&[t("AAPL"), t("TSLA")]));
        assert_eq!(backend.stored(), Some(vec![t("AAPL"), t("TSLA")]));
    }

    #[test]
    fn reset_uses_updated_seed() {
        let mut store = WatchlistStore::new(MemoryBackend::new(), "AAPL");
        store.load();
        store.set_seed("NVDA,AMD");
        assert_eq!(store.reset_to_seed(), &[t("NVDA"), t("AMD")]);
    }

    // ---- persistence failures --------------------------------------------

    #[test]
    fn broken_backend_degrades_to_memory() {
        let mut store = WatchlistStore::new(BrokenBackend, "AAPL,TSLA");

        assert_eq!(set(store.load()), set(&[t("AAPL"), t("TSLA")]));
        assert!(matches!(store.status(), PersistenceStatus::InMemory { reason } if reason.contains("table unavailable")));

        assert!(store.add(t("MSFT")));
        assert!(store.remove(&t("AAPL")));
        assert_eq!(set(store.tickers()), set(&[t("TSLA"), t("MSFT")]));
    }

    #[test]
    fn write_failure_keeps_in_memory_change() {
        let mut store = WatchlistStore::new(ReadOnlyBackend(vec![t("AAPL")]), "");
        store.load();
        assert_eq!(store.status(), &PersistenceStatus::Durable);

        assert!(store.add(t("TSLA")));
        assert!(store.tickers().contains(&t("TSLA")));
        assert!(matches!(store.status(), PersistenceStatus::InMemory { .. }));
    }

    // ---- open_backend ----------------------------------------------------

    #[test]
    fn ephemeral_config_never_touches_disk() {
        let path = temp_path();
        let config = RuntimeConfig {
            watchlist_path: path.display().to_string(),
            ephemeral: true,
            ..RuntimeConfig::default()
        };

        let mut store = WatchlistStore::new(open_backend(&config), "AAPL");
        store.load();
        assert!(store.add(t("TSLA")));

        assert_eq!(store.tickers(), &[t("AAPL"), t("TSLA")]);
        assert_eq!(store.status(), &PersistenceStatus::Durable);
        assert!(!path.exists());
    }

    #[test]
    fn durable_config_writes_json_file() {
        let path = temp_path();
        let config = RuntimeConfig {
            watchlist_path: path.display().to_string(),
            ..RuntimeConfig::default()
        };

        let mut store = WatchlistStore::new(open_backend(&config), "AAPL");
        store.load();
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    // ---- JsonFileBackend -------------------------------------------------

    #[test]
    fn json_file_missing_reads_as_none() {
        let backend = JsonFileBackend::new(temp_path());
        assert!(backend.read_all().unwrap().is_none());
    }

    #[test]
    fn json_file_write_then_read() {
        let path = temp_path();
        let backend = JsonFileBackend::new(&path);
        let tickers = vec![t("TL0.TG"), t("APC.TG"), t("^GDAXI")];

        backend.write_all(&tickers).unwrap();
        assert_eq!(backend.read_all().unwrap(), Some(tickers));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn json_file_rejects_garbage() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let mut store = WatchlistStore::new(JsonFileBackend::new(&path), "AAPL");
        assert_eq!(store.load(), &[t("AAPL")]);
        assert!(matches!(store.status(), PersistenceStatus::InMemory { .. }));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn json_file_skips_blank_entries() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"["AAPL", "", "  ", " TSLA "]"#).unwrap();

        let mut store = WatchlistStore::new(JsonFileBackend::new(&path), "NVDA");
        assert_eq!(store.load(), &[t("AAPL"), t("TSLA")]);
        assert_eq!(store.status(), &PersistenceStatus::Durable);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn store_survives_restart_on_json_file() {
        let path = temp_path();
        {
            let mut store = WatchlistStore::new(JsonFileBackend::new(&path), "AAPL,TSLA");
            store.load();
            store.add(t("MSFT"));
            store.remove(&t("AAPL"));
        }
        let mut reopened = WatchlistStore::new(JsonFileBackend::new(&path), "AAPL,TSLA");
        assert_eq!(reopened.load(), &[t("TSLA"), t("MSFT")]);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
