// =============================================================================
// Market Data — price series types and the provider seam
// =============================================================================
//
// The engine consumes daily closes through the `MarketDataProvider` trait.
// A batch call returns one entry per requested ticker so that a single bad
// symbol never takes the rest of the watchlist down with it.
// =============================================================================

pub mod cache;
pub mod yahoo;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Ticker;

pub use cache::CachedProvider;
pub use yahoo::YahooClient;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single daily close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Daily closing prices for one ticker, ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: Ticker,
    /// Human-readable instrument name, if the provider supplied one.
    pub name: Option<String>,
    pub currency: Option<String>,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    /// The closing-price column, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Why a single ticker could not be fetched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },

    #[error("no price data returned")]
    NoData,

    #[error("malformed provider response: {0}")]
    Parse(String),

    #[error("ticker missing from provider response")]
    Missing,
}

/// Per-ticker outcome of one batched fetch.
pub type FetchBatch = BTreeMap<Ticker, Result<PriceSeries, FetchError>>;

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// Source of daily closing prices.
///
/// Implementations must return an entry for every requested ticker.  Timeouts
/// and retries are the implementation's concern.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_daily_closes(&self, tickers: &[Ticker], lookback_days: u32) -> FetchBatch;
}
