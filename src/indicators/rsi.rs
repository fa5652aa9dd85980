// =============================================================================
// Relative Strength Index (RSI) — rolling simple-mean variant
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an instrument is overbought or oversold.
//
// Step 1 — Compute price changes from consecutive closes.  The first close has
//          no predecessor and counts as a zero change.
// Step 2 — Split every change into a gain (positive part) and a loss
//          (magnitude of the negative part).
// Step 3 — Average gains and losses over a trailing window of `period`
//          samples (arithmetic mean, not Wilder's exponential smoothing).
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// The output is aligned 1:1 with the input closes.  Entries whose window is
// not yet full are `None`.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::market_data::PriceSeries;

/// Default look-back window.
pub const DEFAULT_PERIOD: usize = 14;

/// RSI value reported for a window with no price movement at all.
pub const NEUTRAL_RSI: f64 = 50.0;

/// One RSI sample aligned with the close it was computed at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsiPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Compute the RSI series for `closes` using a trailing window of `period`.
///
/// The returned vector always has `closes.len()` entries.  The first defined
/// value sits at index `period - 1`; everything before it is `None`.
///
/// # Edge cases
/// - `period == 0` or `closes.len() < period` => every entry is `None`.
/// - Average loss of zero with gains => 100.0.
/// - Average gain of zero with losses => 0.0.
/// - No movement in the window => [`NEUTRAL_RSI`].
/// - Non-finite results (e.g. NaN closes) => `None` for that entry.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    // --- Gains / losses per close (index 0 has no predecessor) --------------
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    gains.push(0.0_f64);
    losses.push(0.0_f64);
    for w in closes.windows(2) {
        let delta = w[1] - w[0];
        if delta.is_finite() {
            gains.push(delta.max(0.0));
            losses.push((-delta).max(0.0));
        } else {
            // `f64::max` swallows NaN; keep it so every window touching it is None.
            gains.push(f64::NAN);
            losses.push(f64::NAN);
        }
    }

    // --- Trailing simple means ----------------------------------------------
    let period_f = period as f64;
    for end in (period - 1)..closes.len() {
        let start = end + 1 - period;
        let avg_gain = gains[start..=end].iter().sum::<f64>() / period_f;
        let avg_loss = losses[start..=end].iter().sum::<f64>() / period_f;
        result[end] = rsi_from_averages(avg_gain, avg_loss);
    }

    result
}

/// Most recent RSI value, or `None` when the window never filled.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied().flatten()
}

/// RSI for a fetched price series, aligned with its timestamps.
pub fn rsi_series(series: &PriceSeries, period: usize) -> Vec<RsiPoint> {
    let values = calculate_rsi(&series.closes(), period);
    series
        .points
        .iter()
        .zip(values)
        .map(|(p, value)| RsiPoint {
            timestamp: p.timestamp,
            value,
        })
        .collect()
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_gain == 0.0 && avg_loss == 0.0 {
        NEUTRAL_RSI
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    if rsi.is_finite() {
        Some(rsi.clamp(0.0, 100.0))
    } else {
        None
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::PricePoint;
    use crate::types::Ticker;
    use chrono::TimeZone;

    const GOLDEN: [f64; 14] = [
        44.0, 44.25, 44.5, 43.75, 44.5, 44.75, 45.1, 45.4, 46.0, 45.8, 46.3, 46.05, 46.4, 46.9,
    ];

    // ---- calculate_rsi ---------------------------------------------------

    #[test]
    fn golden_value_on_fourteenth_point() {
        // Gains sum to 4.10, losses to 1.20 => RSI = 100 * 4.1 / 5.3.
        let series = calculate_rsi(&GOLDEN, 14);
        assert_eq!(series.len(), 14);
        assert!(series[..13].iter().all(Option::is_none));
        let v = series[13].unwrap();
        assert!((v - 77.358_490_566).abs() < 1e-6, "got {v}");
    }

    #[test]
    fn output_length_matches_input() {
        for n in [0usize, 1, 5, 13, 14, 15, 60] {
            let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i % 7) as f64).collect();
            assert_eq!(calculate_rsi(&closes, 14).len(), n);
        }
    }

    #[test]
    fn insufficient_data_is_all_none() {
        let closes: Vec<f64> = (1..=13).map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14);
        assert_eq!(series.len(), 13);
        assert!(series.iter().all(Option::is_none));
        assert!(latest_rsi(&closes, 14).is_none());
    }

    #[test]
    fn period_zero_is_all_none() {
        let series = calculate_rsi(&[1.0, 2.0, 3.0], 0);
        assert_eq!(series, vec![None, None, None]);
    }

    #[test]
    fn empty_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
        assert!(latest_rsi(&[], 14).is_none());
    }

    #[test]
    fn all_gains_saturates_to_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14);
        for v in series.iter().skip(13) {
            let v = v.unwrap();
            assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
        }
    }

    #[test]
    fn all_losses_drops_to_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14);
        for v in series.iter().skip(13) {
            let v = v.unwrap();
            assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
        }
    }

    #[test]
    fn flat_market_is_neutral() {
        let closes = vec![100.0; 30];
        let series = calculate_rsi(&closes, 14);
        for v in series.iter().skip(13) {
            assert_eq!(v.unwrap(), NEUTRAL_RSI);
        }
    }

    #[test]
    fn values_stay_in_range() {
        // Deterministic pseudo-random walk.
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let mut price = 50.0_f64;
        let mut closes = Vec::new();
        for _ in 0..500 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let step = (state % 2001) as f64 / 1000.0 - 1.0;
            price = (price + step).max(0.01);
            closes.push(price);
        }
        for period in [2, 5, 14, 30] {
            let series = calculate_rsi(&closes, period);
            for v in series.iter().skip(period - 1) {
                let v = v.unwrap();
                assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
            }
        }
    }

    #[test]
    fn fast_period_uses_short_window() {
        // Window covers the last five changes: +1 +1 +1 -1 +1 => RSI 80.
        let closes = [10.0, 11.0, 12.0, 13.0, 12.0, 13.0];
        let v = latest_rsi(&closes, 5).unwrap();
        assert!((v - 80.0).abs() < 1e-10, "got {v}");
    }

    #[test]
    fn nan_close_yields_none() {
        let mut closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        closes[19] = f64::NAN;
        let series = calculate_rsi(&closes, 14);
        assert!(series[18].is_some());
        assert!(series[19].is_none());
    }

    #[test]
    fn nan_mid_series_blanks_every_window_touching_it() {
        let mut closes: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        closes[10] = f64::NAN;
        let series = calculate_rsi(&closes, 14);

        // Changes at 10 and 11 are non-finite; windows ending 13..=24 cover them.
        assert!(series[..=24].iter().all(Option::is_none));
        assert!(series[25..].iter().all(|v| *v == Some(100.0)));
    }

    // ---- rsi_series ------------------------------------------------------

    #[test]
    fn series_is_aligned_with_timestamps() {
        let points: Vec<PricePoint> = GOLDEN
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 86_400, 0).unwrap(),
                close,
            })
            .collect();
        let series = PriceSeries {
            ticker: Ticker::parse("AAPL").unwrap(),
            name: None,
            currency: None,
            points,
        };

        let rsi = rsi_series(&series, 14);
        assert_eq!(rsi.len(), series.points.len());
        for (r, p) in rsi.iter().zip(&series.points) {
            assert_eq!(r.timestamp, p.timestamp);
        }
        assert!(rsi.last().unwrap().value.is_some());
    }
}
