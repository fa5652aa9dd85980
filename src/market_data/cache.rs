// =============================================================================
// Fetch Cache — TTL memo in front of the market-data provider
// =============================================================================
//
// Dashboard passes repeat within seconds of each other (page reloads, polling
// front-ends), so successful series are kept for a configurable TTL keyed by
// the requested ticker set and look-back.  Only `Ok` entries are stored: a
// ticker that failed is requested again on the next pass while the tickers
// that already succeeded keep being served from memory.
// =============================================================================

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{FetchBatch, MarketDataProvider};
use crate::types::Ticker;

// ---------------------------------------------------------------------------
// CacheKey
// ---------------------------------------------------------------------------

/// Identifies one batched request: the sorted, de-duplicated ticker set plus
/// the look-back it was fetched with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tickers: Vec<Ticker>,
    lookback_days: u32,
}

impl CacheKey {
    pub fn new(tickers: &[Ticker], lookback_days: u32) -> Self {
        let mut tickers = tickers.to_vec();
        tickers.sort();
        tickers.dedup();
        Self {
            tickers,
            lookback_days,
        }
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }
}

// ---------------------------------------------------------------------------
// FetchCache -- time-bounded memo of successful series
// ---------------------------------------------------------------------------

struct CacheEntry {
    batch: FetchBatch,
    fetched_at: Instant,
}

/// Thread-safe cache of fetch results.  An entry older than `ttl` is treated
/// as absent and dropped on the next lookup.
pub struct FetchCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl FetchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<FetchBatch> {
        self.get_at(key, Instant::now())
    }

    /// Merge `batch` into the entry for `key`.  A fresh entry keeps its
    /// first fetch instant, so late additions expire together with it.
    pub fn store(&self, key: CacheKey, batch: FetchBatch) {
        self.store_at(key, batch, Instant::now());
    }

    /// Drop every entry.
    pub fn invalidate(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "fetch cache invalidated");
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<FetchBatch> {
        let mut entries = self.entries.lock();
        let fresh = entries
            .get(key)
            .map(|e| now.saturating_duration_since(e.fetched_at) < self.ttl)?;
        if fresh {
            entries.get(key).map(|e| e.batch.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    fn store_at(&self, key: CacheKey, batch: FetchBatch, now: Instant) {
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, e| now.saturating_duration_since(e.fetched_at) < ttl);
        match entries.entry(key) {
            Entry::Occupied(mut slot) => slot.get_mut().batch.extend(batch),
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry {
                    batch,
                    fetched_at: now,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CachedProvider -- FetchCache in front of any MarketDataProvider
// ---------------------------------------------------------------------------

/// Wraps a provider with a [`FetchCache`].
///
/// Only tickers without a cached series go upstream; their failures are
/// returned but never stored.
pub struct CachedProvider {
    inner: Arc<dyn MarketDataProvider>,
    cache: FetchCache,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn MarketDataProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: FetchCache::new(ttl),
        }
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

#[async_trait]
impl MarketDataProvider for CachedProvider {
    async fn fetch_daily_closes(&self, tickers: &[Ticker], lookback_days: u32) -> FetchBatch {
        let key = CacheKey::new(tickers, lookback_days);
        let mut batch = self.cache.get(&key).unwrap_or_default();

        let missing: Vec<Ticker> = key
            .tickers()
            .iter()
            .filter(|t| !batch.contains_key(*t))
            .cloned()
            .collect();
        if missing.is_empty() {
            debug!(tickers = key.tickers().len(), "fetch cache hit");
            return batch;
        }
        debug!(cached = batch.len(), missing = missing.len(), "fetch cache miss");

        let fetched = self.inner.fetch_daily_closes(&missing, lookback_days).await;

        let succeeded: FetchBatch = fetched
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(ticker, result)| (ticker.clone(), result.clone()))
            .collect();
        if !succeeded.is_empty() {
            self.cache.store(key, succeeded);
        }

        batch.extend(fetched);
        batch
    }
}
