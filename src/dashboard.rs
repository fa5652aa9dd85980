// =============================================================================
// Dashboard — one synchronous pass from watchlist to renderable cards
// =============================================================================
//
// 1. Fetch daily closes for every ticker in a single batched call.
// 2. Compute RSI per ticker.
// 3. Return one report per ticker, in watchlist order.  A failed fetch yields
//    an error report for that ticker only; the rest of the batch still
//    renders.
//
// Rounding to two decimals happens here, never in the indicator.
// =============================================================================

use serde::Serialize;
use tracing::{debug, warn};

use crate::indicators::{latest_rsi, rsi_series, RsiPoint};
use crate::market_data::{FetchError, MarketDataProvider, PricePoint, PriceSeries};
use crate::runtime_config::RuntimeConfig;
use crate::types::{RsiZone, Ticker};

/// Indicator parameters for one dashboard pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub rsi_period: usize,
    pub fast_rsi_period: Option<usize>,
    pub lookback_days: u32,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for DashboardSettings {
    fn from(cfg: &RuntimeConfig) -> Self {
        Self {
            rsi_period: cfg.rsi_period,
            fast_rsi_period: cfg.fast_rsi_period,
            lookback_days: cfg.lookback_days,
            oversold: cfg.oversold,
            overbought: cfg.overbought,
        }
    }
}

/// Everything the presentation layer needs to draw one ticker card.
#[derive(Debug, Clone, Serialize)]
pub struct TickerCard {
    pub ticker: Ticker,
    /// Instrument name, or the ticker itself when the provider had none.
    pub name: String,
    pub currency: Option<String>,
    pub last_price: f64,
    pub price_display: String,
    /// `None` when the history is shorter than the RSI period.
    pub latest_rsi: Option<f64>,
    pub rsi_display: Option<String>,
    pub fast_rsi: Option<f64>,
    pub zone: Option<RsiZone>,
    pub rsi_period: usize,
    pub history: Vec<PricePoint>,
    pub rsi: Vec<RsiPoint>,
}

/// Result for one ticker of a dashboard pass.
#[derive(Debug, Clone, Serialize)]
pub struct TickerReport {
    pub ticker: Ticker,
    #[serde(flatten)]
    pub result: ReportResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportResult {
    Ok { card: TickerCard },
    Error { reason: String },
}

impl TickerReport {
    pub fn card(&self) -> Option<&TickerCard> {
        match &self.result {
            ReportResult::Ok { card } => Some(card),
            ReportResult::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            ReportResult::Ok { .. } => None,
            ReportResult::Error { reason } => Some(reason),
        }
    }
}

/// Fetch, compute and assemble cards for `tickers`.
pub async fn build_dashboard(
    tickers: &[Ticker],
    provider: &dyn MarketDataProvider,
    settings: &DashboardSettings,
) -> Vec<TickerReport> {
    if tickers.is_empty() {
        return Vec::new();
    }

    let mut batch = provider
        .fetch_daily_closes(tickers, settings.lookback_days)
        .await;

    tickers
        .iter()
        .map(|ticker| {
            let result = match batch.remove(ticker) {
                Some(Ok(series)) if !series.is_empty() => ReportResult::Ok {
                    card: build_card(series, settings),
                },
                Some(Ok(_)) => ReportResult::Error {
                    reason: FetchError::NoData.to_string(),
                },
                Some(Err(e)) => ReportResult::Error {
                    reason: e.to_string(),
                },
                None => ReportResult::Error {
                    reason: FetchError::Missing.to_string(),
                },
            };
            if let ReportResult::Error { reason } = &result {
                warn!(ticker = %ticker, reason = %reason, "ticker skipped on dashboard");
            }
            TickerReport {
                ticker: ticker.clone(),
                result,
            }
        })
        .collect()
}

/// Build a card from a non-empty series.
pub fn build_card(series: PriceSeries, settings: &DashboardSettings) -> TickerCard {
    let closes = series.closes();
    let rsi = rsi_series(&series, settings.rsi_period);
    let latest = rsi.last().and_then(|p| p.value);
    let fast_rsi = settings
        .fast_rsi_period
        .and_then(|period| latest_rsi(&closes, period));
    let last_price = series.last_close().unwrap_or(f64::NAN);

    debug!(
        ticker = %series.ticker,
        points = closes.len(),
        rsi = ?latest,
        "card built"
    );

    TickerCard {
        name: series
            .name
            .clone()
            .unwrap_or_else(|| series.ticker.to_string()),
        currency: series.currency.clone(),
        last_price,
        price_display: format!("{last_price:.2}"),
        latest_rsi: latest,
        rsi_display: latest.map(|v| format!("{v:.2}")),
        fast_rsi,
        zone: latest.map(|v| RsiZone::classify(v, settings.oversold, settings.overbought)),
        rsi_period: settings.rsi_period,
        rsi,
        ticker: series.ticker,
        history: series.points,
    }
}
