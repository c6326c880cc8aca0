//! Price data: the series the engine consumes and the source interface that supplies it.
//!
//! Retrieval and caching live outside the core. A `PriceSource` only has to hand
//! back bars that pass `PriceSeries` validation.

pub mod series;
pub mod timeframe;

pub use series::PriceSeries;
pub use timeframe::Timeframe;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Structured errors for price data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("price series is empty")]
    Empty,

    #[error("timestamps not strictly increasing at bar {index}: {previous} then {current}")]
    NonMonotonic {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    #[error("no data for {symbol} ({timeframe}): {reason}")]
    NoData {
        symbol: String,
        timeframe: Timeframe,
        reason: String,
    },

    #[error("data error: {0}")]
    Other(String),
}

/// Anything that can hand the engine an ordered bar series.
///
/// `start` and `end` are inclusive bounds; `None` means unbounded.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, DataError>;
}
