//! Moving Average Convergence/Divergence.
//!
//! macd      = EMA(close, fast) - EMA(close, slow)
//! signal    = EMA(macd, signal)
//! histogram = macd - signal
//!
//! First finite macd at index slow-1, first finite signal at slow+signal-2.

use super::ema::ema_of_series;

/// The three MACD lines, each the same length as the input.
#[derive(Debug, Clone)]
pub struct MacdLines {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Macd {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self { fast, slow, signal }
    }

    pub fn compute(&self, closes: &[f64]) -> MacdLines {
        let fast = ema_of_series(closes, self.fast);
        let slow = ema_of_series(closes, self.slow);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_of_series(&macd, self.signal);
        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();
        MacdLines {
            macd,
            signal,
            histogram,
        }
    }
}
