//! Signal annotation: per-bar entry flags derived from the price series.
//!
//! Annotation is pure and single-pass: it runs once before the bar loop and the
//! engine only reads the resulting columns. Entries are edge-triggered: a flag is
//! true on the bar where its condition first becomes true, never while it merely
//! persists.

pub mod envelope;
pub mod macd_cross;

use crate::data::PriceSeries;
use crate::domain::PositionSide;
use crate::indicators::IndicatorValues;
use crate::scenario::SignalRule;

/// Read-only signal columns aligned with the price series.
///
/// `*_bias` are level conditions (e.g. MACD above its signal line); `*_entry`
/// are their rising edges.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalAnnotation {
    pub long_entry: Vec<bool>,
    pub short_entry: Vec<bool>,
    pub long_bias: Vec<bool>,
    pub short_bias: Vec<bool>,
    pub indicators: IndicatorValues,
}

/// Signal flags of a single bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarSignals {
    pub long_entry: bool,
    pub short_entry: bool,
    pub long_bias: bool,
    pub short_bias: bool,
}

impl BarSignals {
    pub fn entry(&self, side: PositionSide) -> bool {
        match side {
            PositionSide::Long => self.long_entry,
            PositionSide::Short => self.short_entry,
        }
    }

    pub fn bias(&self, side: PositionSide) -> bool {
        match side {
            PositionSide::Long => self.long_bias,
            PositionSide::Short => self.short_bias,
        }
    }
}

impl SignalAnnotation {
    /// Build an annotation from level conditions; edges are derived here.
    ///
    /// `valid[i]` is false while the underlying indicators are still warming up.
    /// No edge fires unless both the bar and its predecessor are valid.
    pub fn from_levels(
        long_bias: Vec<bool>,
        short_bias: Vec<bool>,
        valid: &[bool],
        indicators: IndicatorValues,
    ) -> Self {
        let long_entry = rising_edges(&long_bias, valid);
        let short_entry = rising_edges(&short_bias, valid);
        Self {
            long_entry,
            short_entry,
            long_bias,
            short_bias,
            indicators,
        }
    }

    pub fn len(&self) -> usize {
        self.long_entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long_entry.is_empty()
    }

    pub fn at(&self, bar_index: usize) -> BarSignals {
        BarSignals {
            long_entry: self.long_entry[bar_index],
            short_entry: self.short_entry[bar_index],
            long_bias: self.long_bias[bar_index],
            short_bias: self.short_bias[bar_index],
        }
    }

    pub fn entry_count(&self, side: PositionSide) -> usize {
        let column = match side {
            PositionSide::Long => &self.long_entry,
            PositionSide::Short => &self.short_entry,
        };
        column.iter().filter(|&&fired| fired).count()
    }
}

/// Annotate a series according to the configured rule.
///
/// The rule is dispatched once here; the bar loop never inspects it again.
pub fn annotate(series: &PriceSeries, rule: &SignalRule) -> SignalAnnotation {
    match rule {
        SignalRule::MacdCross(params) => macd_cross::annotate(series, params),
        SignalRule::Envelope(params) => envelope::annotate(series, params),
    }
}

/// `edge[i] = level[i] && !level[i-1]`, restricted to bars where both are valid.
fn rising_edges(level: &[bool], valid: &[bool]) -> Vec<bool> {
    (0..level.len())
        .map(|i| i > 0 && valid[i] && valid[i - 1] && level[i] && !level[i - 1])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_fire_once_per_transition() {
        let level = [false, true, true, true, false, true];
        let valid = [true; 6];
        assert_eq!(
            rising_edges(&level, &valid),
            vec![false, true, false, false, false, true]
        );
    }

    #[test]
    fn no_edge_out_of_warmup() {
        let level = [false, true, true];
        let valid = [false, true, true];
        assert_eq!(rising_edges(&level, &valid), vec![false, false, false]);
    }

    #[test]
    fn first_bar_never_fires() {
        assert_eq!(rising_edges(&[true], &[true]), vec![false]);
    }

    #[test]
    fn bar_signals_by_side() {
        let s = BarSignals {
            long_entry: true,
            short_entry: false,
            long_bias: true,
            short_bias: false,
        };
        assert!(s.entry(PositionSide::Long));
        assert!(!s.entry(PositionSide::Short));
        assert!(s.bias(PositionSide::Long));
    }
}
