//! Moving-average envelope breakout rule.
//!
//! Bands: `ma × (1 ± d)` for every configured deviation `d`. The innermost band
//! (first deviation) drives entries:
//! - long bias while close > upper band, long entry on the bar it first closes above
//! - short bias while close < lower band, short entry on the bar it first closes below

use super::SignalAnnotation;
use crate::data::PriceSeries;
use crate::indicators::{ema_of_series, sma_of_series, IndicatorValues};
use crate::scenario::{AverageType, EnvelopeParams};

pub fn annotate(series: &PriceSeries, params: &EnvelopeParams) -> SignalAnnotation {
    let closes = series.closes();
    let base = match params.average_type {
        AverageType::Sma => sma_of_series(&closes, params.period),
        AverageType::Ema => ema_of_series(&closes, params.period),
    };

    let mut indicators = IndicatorValues::new();
    let mut entry_bands: Option<(Vec<f64>, Vec<f64>)> = None;
    for (k, &d) in params.deviations.iter().enumerate() {
        let high: Vec<f64> = base.iter().map(|m| m * (1.0 + d)).collect();
        let low: Vec<f64> = base.iter().map(|m| m * (1.0 - d)).collect();
        if entry_bands.is_none() {
            entry_bands = Some((high.clone(), low.clone()));
        }
        indicators.insert(format!("band_high_{}", k + 1), high);
        indicators.insert(format!("band_low_{}", k + 1), low);
    }
    // Validation guarantees at least one deviation; an empty list degrades to no bias.
    let (high, low) = entry_bands.unwrap_or_else(|| {
        (vec![f64::NAN; closes.len()], vec![f64::NAN; closes.len()])
    });

    let valid: Vec<bool> = (0..closes.len())
        .map(|i| high[i].is_finite() && low[i].is_finite())
        .collect();
    let long_bias = (0..closes.len())
        .map(|i| valid[i] && closes[i] > high[i])
        .collect();
    let short_bias = (0..closes.len())
        .map(|i| valid[i] && closes[i] < low[i])
        .collect();

    indicators.insert("ma_base", base);
    SignalAnnotation::from_levels(long_bias, short_bias, &valid, indicators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, PositionSide};
    use chrono::{Duration, NaiveDate};

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: start + Duration::hours(4 * i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: 5.0,
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn params(average_type: AverageType) -> EnvelopeParams {
        EnvelopeParams {
            average_type,
            period: 3,
            deviations: vec![0.05, 0.10],
        }
    }

    #[test]
    fn breakout_above_upper_band_fires_long() {
        // SMA(3) at index 3 = (100+100+120)/3 = 106.67, upper = 112 → 120 breaks out
        let closes = [100.0, 100.0, 100.0, 120.0, 125.0, 130.0];
        let ann = annotate(&series(&closes), &params(AverageType::Sma));
        assert!(ann.long_entry[3]);
        assert_eq!(ann.entry_count(PositionSide::Long), 1);
        assert_eq!(ann.entry_count(PositionSide::Short), 0);
    }

    #[test]
    fn breakdown_below_lower_band_fires_short() {
        let closes = [100.0, 100.0, 100.0, 80.0, 78.0];
        let ann = annotate(&series(&closes), &params(AverageType::Sma));
        assert!(ann.short_entry[3]);
        assert!(ann.short_bias[4]);
        assert!(!ann.short_entry[4]);
    }

    #[test]
    fn quiet_market_stays_inside_bands() {
        let closes = [100.0, 101.0, 100.5, 99.8, 100.2, 100.9];
        for ty in [AverageType::Sma, AverageType::Ema] {
            let ann = annotate(&series(&closes), &params(ty));
            assert_eq!(ann.entry_count(PositionSide::Long), 0);
            assert_eq!(ann.entry_count(PositionSide::Short), 0);
        }
    }

    #[test]
    fn all_bands_are_exported() {
        let ann = annotate(&series(&[100.0; 5]), &params(AverageType::Ema));
        let names: Vec<&str> = ann.indicators.names().collect();
        assert_eq!(
            names,
            vec!["band_high_1", "band_high_2", "band_low_1", "band_low_2", "ma_base"]
        );
        let high = ann.indicators.get("band_high_2", 4).unwrap();
        assert!((high - 110.0).abs() < 1e-9);
    }
}
