//! Validated, time-ordered price series.

use chrono::NaiveDateTime;

use super::DataError;
use crate::domain::Bar;

/// An ordered OHLCV series accepted by the engine.
///
/// Guarantees: non-empty, strictly increasing timestamps, and every bar sane
/// (finite, positive prices with `low <= open, close <= high`).
/// Gaps between bars are allowed; the engine never assumes a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self, DataError> {
        if bars.is_empty() {
            return Err(DataError::Empty);
        }
        for (index, bar) in bars.iter().enumerate() {
            if bar.is_void() {
                return Err(DataError::InvalidBar {
                    index,
                    reason: "non-finite OHLC value".into(),
                });
            }
            if !bar.is_sane() {
                return Err(DataError::InvalidBar {
                    index,
                    reason: format!(
                        "inconsistent prices o={} h={} l={} c={}",
                        bar.open, bar.high, bar.low, bar.close
                    ),
                });
            }
            if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
                return Err(DataError::NonMonotonic {
                    index,
                    previous: bars[index - 1].timestamp,
                    current: bar.timestamp,
                });
            }
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed series; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn first_timestamp(&self) -> NaiveDateTime {
        self.bars[0].timestamp
    }

    pub fn last_timestamp(&self) -> NaiveDateTime {
        self.bars[self.bars.len() - 1].timestamp
    }
}
