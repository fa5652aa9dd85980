// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator implementations.  Numeric edge cases never
// raise: insufficient data and undefined values surface as `None`.

pub mod rsi;

pub use rsi::{latest_rsi, rsi_series, RsiPoint, DEFAULT_PERIOD};
