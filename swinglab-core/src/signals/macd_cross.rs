//! MACD crossover rule.
//!
//! Long entry on the bar where MACD moves from <= signal to > signal.
//! Short entry on the bar where MACD moves from >= signal to < signal.

use super::SignalAnnotation;
use crate::data::PriceSeries;
use crate::indicators::{IndicatorValues, Macd};
use crate::scenario::MacdParams;

pub fn annotate(series: &PriceSeries, params: &MacdParams) -> SignalAnnotation {
    let lines = Macd::new(params.fast, params.slow, params.signal).compute(&series.closes());

    let valid: Vec<bool> = lines
        .macd
        .iter()
        .zip(&lines.signal)
        .map(|(m, s)| m.is_finite() && s.is_finite())
        .collect();
    let long_bias = (0..valid.len())
        .map(|i| valid[i] && lines.macd[i] > lines.signal[i])
        .collect();
    let short_bias = (0..valid.len())
        .map(|i| valid[i] && lines.macd[i] < lines.signal[i])
        .collect();

    let mut indicators = IndicatorValues::new();
    indicators.insert("macd", lines.macd);
    indicators.insert("macd_signal", lines.signal);
    indicators.insert("macd_hist", lines.histogram);

    SignalAnnotation::from_levels(long_bias, short_bias, &valid, indicators)
}
