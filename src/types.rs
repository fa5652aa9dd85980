// =============================================================================
// Shared types used across the RSI watchlist service
// =============================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection returned when a string cannot be used as a ticker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickerError {
    #[error("ticker must not be empty")]
    Empty,
}

/// Exchange-qualified instrument symbol, e.g. `AAPL` or `TL0.TG`.
///
/// The symbol is opaque to the engine: surrounding whitespace is trimmed and
/// the empty string is rejected, nothing else is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TickerError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}

impl std::str::FromStr for Ticker {
    type Err = TickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the latest RSI value sits relative to the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

impl RsiZone {
    /// Classify `value` with strict thresholds: below `oversold` is a buy
    /// zone, above `overbought` a sell zone.
    pub fn classify(value: f64, oversold: f64, overbought: f64) -> Self {
        if value < oversold {
            Self::Oversold
        } else if value > overbought {
            Self::Overbought
        } else {
            Self::Neutral
        }
    }
}

impl std::fmt::Display for RsiZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oversold => write!(f, "OVERSOLD"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Overbought => write!(f, "OVERBOUGHT"),
        }
    }
}
