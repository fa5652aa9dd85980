// =============================================================================
// Yahoo Finance chart client — daily closes for the watchlist
// =============================================================================
//
// GET {base}/v8/finance/chart/{ticker}?period1=..&period2=..&interval=1d
//
// One request per ticker, issued concurrently for a batch.  The adjusted
// close column is preferred when present; rows with a missing close are
// dropped.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{FetchBatch, FetchError, MarketDataProvider, PricePoint, PriceSeries};
use crate::types::Ticker;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Market data provider backed by the public Yahoo Finance chart API.
#[derive(Clone)]
pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
}

impl YahooClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at another host (a proxy or a local fixture server).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("Mozilla/5.0")
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "YahooClient initialised");

        Ok(Self { client, base_url })
    }

    /// Fetch daily closes for a single ticker covering the last
    /// `lookback_days` calendar days.
    #[instrument(skip(self, ticker), fields(ticker = %ticker), name = "yahoo::fetch_chart")]
    pub async fn fetch_chart(
        &self,
        ticker: &Ticker,
        lookback_days: u32,
    ) -> Result<PriceSeries, FetchError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FetchError::Http(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Http("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker.as_str()]);

        let period2 = Utc::now().timestamp();
        let period1 = period2 - i64::from(lookback_days) * 86_400;

        let resp = self
            .client
            .get(url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        match serde_json::from_str::<ChartResponse>(&body) {
            Ok(parsed) => parse_chart(ticker, parsed),
            Err(_) if !status.is_success() => Err(FetchError::Status(status.as_u16())),
            Err(e) => Err(FetchError::Parse(e.to_string())),
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    async fn fetch_daily_closes(&self, tickers: &[Ticker], lookback_days: u32) -> FetchBatch {
        let results = join_all(tickers.iter().map(|t| self.fetch_chart(t, lookback_days))).await;

        let mut batch = FetchBatch::new();
        for (ticker, result) in tickers.iter().zip(results) {
            match &result {
                Ok(series) => debug!(ticker = %ticker, points = series.len(), "daily closes fetched"),
                Err(e) => warn!(ticker = %ticker, error = %e, "daily close fetch failed"),
            }
            batch.insert(ticker.clone(), result);
        }
        batch
    }
}

impl std::fmt::Debug for YahooClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_chart(ticker: &Ticker, resp: ChartResponse) -> Result<PriceSeries, FetchError> {
    if let Some(err) = resp.chart.error {
        return Err(FetchError::Provider {
            code: err.code,
            description: err.description,
        });
    }

    let data = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or(FetchError::NoData)?;

    let closes = data
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .filter(|c| !c.is_empty())
        .or_else(|| data.indicators.quote.into_iter().next().map(|q| q.close))
        .ok_or(FetchError::NoData)?;

    let mut points: Vec<PricePoint> = data
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            let close = close.filter(|c| c.is_finite())?;
            let timestamp = Utc.timestamp_opt(ts, 0).single()?;
            Some(PricePoint { timestamp, close })
        })
        .collect();

    if points.is_empty() {
        return Err(FetchError::NoData);
    }
    points.sort_by_key(|p| p.timestamp);

    Ok(PriceSeries {
        ticker: ticker.clone(),
        name: data.meta.long_name.or(data.meta.short_name),
        currency: data.meta.currency,
        points,
    })
}
