//! Synthetic price series for development and tests.
//!
//! A geometric random walk on the timeframe's grid. The RNG seed is a BLAKE3
//! hash of symbol and timeframe, so the same request always yields the same
//! bars. Results produced on synthetic data are tagged as such.

use chrono::{NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use swinglab_core::data::{DataError, PriceSeries, PriceSource, Timeframe};
use swinglab_core::domain::Bar;

/// Deterministic random-walk price source.
#[derive(Debug, Clone)]
pub struct SyntheticPriceSource {
    /// First bar time when the request has no start bound.
    pub default_start: NaiveDateTime,
    /// Maximum number of bars generated per request.
    pub max_bars: usize,
    pub initial_price: f64,
    /// Per-bar return is drawn from `[-volatility, volatility)`.
    pub volatility: f64,
}

impl Default for SyntheticPriceSource {
    fn default() -> Self {
        Self {
            default_start: NaiveDate::from_ymd_opt(2023, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            max_bars: 1_000,
            initial_price: 100.0,
            volatility: 0.02,
        }
    }
}

impl SyntheticPriceSource {
    pub fn with_bars(max_bars: usize) -> Self {
        Self {
            max_bars,
            ..Self::default()
        }
    }

    fn seed(symbol: &str, timeframe: Timeframe) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(timeframe.label().as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Generate bars without the `PriceSource` window semantics.
    pub fn generate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Vec<Bar> {
        let mut rng = StdRng::from_seed(Self::seed(symbol, timeframe));
        let step = timeframe.duration();

        let mut bars = Vec::with_capacity(self.max_bars);
        let mut price = self.initial_price;
        let mut time = start;
        while bars.len() < self.max_bars && end.map_or(true, |e| time <= e) {
            let ret: f64 = rng.gen_range(-self.volatility..self.volatility);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.005));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.005));
            let volume = rng.gen_range(100.0..10_000.0);
            bars.push(Bar {
                timestamp: time,
                open,
                high,
                low,
                close,
                volume,
            });
            price = close;
            time += step;
        }
        bars
    }
}

impl PriceSource for SyntheticPriceSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, DataError> {
        let bars = self.generate(symbol, timeframe, start.unwrap_or(self.default_start), end);
        if bars.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                timeframe,
                reason: "requested window is empty".to_string(),
            });
        }
        PriceSeries::new(bars)
    }
}
