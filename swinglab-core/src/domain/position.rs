//! Position: the state machine for a single directional exposure.
//!
//! ```text
//!           open(Long)              close
//!   Flat ──────────────▶ Long ─────────────▶ Flat
//!     │                                        ▲
//!     └──────────────▶ Short ──────────────────┘
//!           open(Short)             close
//! ```
//!
//! There is no pending or partially filled state: fills are instantaneous.
//! One `Position` lives for a whole run and is reset in place on close.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::bar::Bar;
use super::trade::CloseReason;

/// Direction of an open exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1.0 for long, -1.0 for short.
    pub fn direction(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State-machine violations. Any of these inside a run is an engine bug.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("cannot open {requested} at {time}: a {current} position is already open")]
    AlreadyOpen {
        current: PositionSide,
        requested: PositionSide,
        time: NaiveDateTime,
    },

    #[error("cannot close at {time}: no position is open")]
    NotOpen { time: NaiveDateTime },

    #[error("invalid entry at {time}: {reason}")]
    InvalidEntry { time: NaiveDateTime, reason: String },
}

/// Snapshot of a completed round-trip, read by the engine right after `close()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub side: PositionSide,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub entry_reason: String,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub close_reason: CloseReason,
    pub initial_margin: f64,
    pub sl_price: f64,
    pub gross_pnl: f64,
    pub open_fee: f64,
    pub close_fee: f64,
    pub net_pnl: f64,
}

/// Snapshot of an exposure that is still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: PositionSide,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub initial_margin: f64,
    pub notional: f64,
    pub sl_price: f64,
}

/// Entry-side fields, present only while the position is open.
#[derive(Debug, Clone)]
struct Entry {
    side: PositionSide,
    time: NaiveDateTime,
    price: f64,
    reason: String,
    open_fee: f64,
    notional: f64,
    sl_price: f64,
}

/// Single-instance position with leverage and fee accounting.
///
/// Accounting:
/// - `open_fee = margin × leverage × open_fee_rate`, charged against the margin
/// - `notional = (margin − open_fee) × leverage`
/// - `gross_pnl = notional × direction × (exit − entry) / entry`
/// - `close_fee = (notional + gross_pnl) × close_fee_rate`
/// - `net_pnl = gross_pnl − open_fee − close_fee`
///
/// The caller returns `initial_margin + net_pnl` to the balance on close.
#[derive(Debug, Clone)]
pub struct Position {
    leverage: f64,
    open_fee_rate: f64,
    close_fee_rate: f64,
    entry: Option<Entry>,
    initial_margin: f64,
    net_pnl: f64,
    last_closed: Option<PositionInfo>,
}

impl Position {
    pub fn new(leverage: f64, open_fee_rate: f64, close_fee_rate: f64) -> Self {
        Self {
            leverage,
            open_fee_rate,
            close_fee_rate,
            entry: None,
            initial_margin: 0.0,
            net_pnl: 0.0,
            last_closed: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.entry.is_some()
    }

    /// Side of the open exposure, `None` when flat.
    pub fn side(&self) -> Option<PositionSide> {
        self.entry.as_ref().map(|e| e.side)
    }

    /// Stop trigger of the open exposure.
    pub fn sl_price(&self) -> Option<f64> {
        self.entry.as_ref().map(|e| e.sl_price)
    }

    /// Capital committed at the last `open()`. Retained after close until the next open.
    pub fn initial_margin(&self) -> f64 {
        self.initial_margin
    }

    /// Realized, fee-adjusted PnL of the last close.
    pub fn net_pnl(&self) -> f64 {
        self.net_pnl
    }

    /// Open a new exposure. Requires the position to be flat.
    pub fn open(
        &mut self,
        time: NaiveDateTime,
        side: PositionSide,
        margin: f64,
        price: f64,
        reason: impl Into<String>,
        sl_price: f64,
    ) -> Result<(), PositionError> {
        if let Some(current) = self.side() {
            return Err(PositionError::AlreadyOpen {
                current,
                requested: side,
                time,
            });
        }
        if !(margin.is_finite() && margin > 0.0) {
            return Err(PositionError::InvalidEntry {
                time,
                reason: format!("margin must be positive, got {margin}"),
            });
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(PositionError::InvalidEntry {
                time,
                reason: format!("entry price must be positive, got {price}"),
            });
        }

        let open_fee = margin * self.leverage * self.open_fee_rate;
        let notional = (margin - open_fee) * self.leverage;

        self.entry = Some(Entry {
            side,
            time,
            price,
            reason: reason.into(),
            open_fee,
            notional,
            sl_price,
        });
        self.initial_margin = margin;
        self.net_pnl = 0.0;
        self.last_closed = None;
        Ok(())
    }

    /// True if this bar's range reaches the stop trigger. Never mutates.
    ///
    /// Long: `low <= sl_price`. Short: `high >= sl_price`. Always false when flat.
    pub fn check_for_sl(&self, bar: &Bar) -> bool {
        match &self.entry {
            Some(e) => match e.side {
                PositionSide::Long => bar.low <= e.sl_price,
                PositionSide::Short => bar.high >= e.sl_price,
            },
            None => false,
        }
    }

    /// Close the open exposure at `price`, realizing fee-adjusted PnL.
    pub fn close(
        &mut self,
        time: NaiveDateTime,
        price: f64,
        reason: CloseReason,
    ) -> Result<(), PositionError> {
        let entry = self.entry.take().ok_or(PositionError::NotOpen { time })?;

        let (gross_pnl, close_fee) = settle(&entry, price, self.close_fee_rate);
        let net_pnl = gross_pnl - entry.open_fee - close_fee;
        self.net_pnl = net_pnl;

        self.last_closed = Some(PositionInfo {
            side: entry.side,
            entry_time: entry.time,
            entry_price: entry.price,
            entry_reason: entry.reason,
            exit_time: time,
            exit_price: price,
            close_reason: reason,
            initial_margin: self.initial_margin,
            sl_price: entry.sl_price,
            gross_pnl,
            open_fee: entry.open_fee,
            close_fee,
            net_pnl,
        });
        Ok(())
    }

    /// Snapshot of the last completed round-trip. Cleared by the next `open()`.
    pub fn info(&self) -> Option<PositionInfo> {
        self.last_closed.clone()
    }

    /// Snapshot of the current exposure, `None` when flat.
    pub fn open_snapshot(&self) -> Option<OpenPosition> {
        self.entry.as_ref().map(|e| OpenPosition {
            side: e.side,
            entry_time: e.time,
            entry_price: e.price,
            initial_margin: self.initial_margin,
            notional: e.notional,
            sl_price: e.sl_price,
        })
    }

    /// Net PnL that closing at `price` would realize. Zero when flat.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match &self.entry {
            Some(e) => {
                let (gross, close_fee) = settle(e, price, self.close_fee_rate);
                gross - e.open_fee - close_fee
            }
            None => 0.0,
        }
    }

    /// Amount that closing at `price` would return to the balance. Zero when flat.
    pub fn mark_to_market(&self, price: f64) -> f64 {
        if self.is_open() {
            self.initial_margin + self.unrealized_pnl(price)
        } else {
            0.0
        }
    }
}

/// Gross PnL and close fee for exiting `entry` at `price`.
fn settle(entry: &Entry, price: f64, close_fee_rate: f64) -> (f64, f64) {
    let gross = entry.notional * entry.side.direction() * (price - entry.price) / entry.price;
    let close_fee = (entry.notional + gross) * close_fee_rate;
    (gross, close_fee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn bar(low: f64, high: f64) -> Bar {
        Bar {
            timestamp: t(5),
            open: (low + high) / 2.0,
            high,
            low,
            close: (low + high) / 2.0,
            volume: 10.0,
        }
    }

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "actual={actual}, expected={expected}"
        );
    }

    #[test]
    fn new_position_is_flat() {
        let pos = Position::new(1.0, 0.0, 0.0);
        assert!(!pos.is_open());
        assert_eq!(pos.side(), None);
        assert_eq!(pos.info(), None);
        assert_eq!(pos.mark_to_market(100.0), 0.0);
    }

    #[test]
    fn open_then_close_long_without_fees() {
        let mut pos = Position::new(2.0, 0.0, 0.0);
        pos.open(t(0), PositionSide::Long, 100.0, 50.0, "Open long", 47.5)
            .unwrap();
        assert_eq!(pos.side(), Some(PositionSide::Long));

        pos.close(t(1), 55.0, CloseReason::OpposingCrossover).unwrap();
        assert!(!pos.is_open());
        // notional 200, +10% move → +20
        assert_approx(pos.net_pnl(), 20.0);
        assert_eq!(pos.initial_margin(), 100.0);

        let info = pos.info().unwrap();
        assert_eq!(info.side, PositionSide::Long);
        assert_eq!(info.exit_price, 55.0);
        assert_eq!(info.close_reason, CloseReason::OpposingCrossover);
    }

    #[test]
    fn short_profits_when_price_falls() {
        let mut pos = Position::new(1.0, 0.0, 0.0);
        pos.open(t(0), PositionSide::Short, 100.0, 200.0, "Open short", 210.0)
            .unwrap();
        pos.close(t(1), 180.0, CloseReason::OpposingCrossover).unwrap();
        assert_approx(pos.net_pnl(), 10.0);
    }

    #[test]
    fn fees_reduce_notional_and_pnl() {
        let mut pos = Position::new(10.0, 0.001, 0.002);
        pos.open(t(0), PositionSide::Long, 100.0, 100.0, "Open long", 95.0)
            .unwrap();
        // open fee = 100 * 10 * 0.001 = 1; notional = 99 * 10 = 990
        let snap = pos.open_snapshot().unwrap();
        assert_approx(snap.notional, 990.0);

        pos.close(t(1), 102.0, CloseReason::OpposingCrossover).unwrap();
        let info = pos.info().unwrap();
        assert_approx(info.open_fee, 1.0);
        assert_approx(info.gross_pnl, 19.8);
        assert_approx(info.close_fee, (990.0 + 19.8) * 0.002);
        assert_approx(info.net_pnl, 19.8 - 1.0 - (990.0 + 19.8) * 0.002);
    }

    #[test]
    fn open_while_open_is_rejected() {
        let mut pos = Position::new(1.0, 0.0, 0.0);
        pos.open(t(0), PositionSide::Long, 100.0, 10.0, "Open long", 9.0)
            .unwrap();
        let err = pos
            .open(t(1), PositionSide::Short, 100.0, 10.0, "Open short", 11.0)
            .unwrap_err();
        assert!(matches!(
            err,
            PositionError::AlreadyOpen {
                current: PositionSide::Long,
                requested: PositionSide::Short,
                ..
            }
        ));
        // state untouched
        assert_eq!(pos.side(), Some(PositionSide::Long));
    }

    #[test]
    fn close_while_flat_is_rejected() {
        let mut pos = Position::new(1.0, 0.0, 0.0);
        let err = pos.close(t(0), 10.0, CloseReason::StopLoss).unwrap_err();
        assert_eq!(err, PositionError::NotOpen { time: t(0) });
    }

    #[test]
    fn non_positive_margin_is_rejected() {
        let mut pos = Position::new(1.0, 0.0, 0.0);
        let err = pos
            .open(t(0), PositionSide::Long, 0.0, 10.0, "Open long", 9.0)
            .unwrap_err();
        assert!(matches!(err, PositionError::InvalidEntry { .. }));
        assert!(!pos.is_open());
    }

    #[test]
    fn stop_check_is_direction_dependent() {
        let mut pos = Position::new(1.0, 0.0, 0.0);
        assert!(!pos.check_for_sl(&bar(1.0, 1000.0)));

        pos.open(t(0), PositionSide::Long, 100.0, 100.0, "Open long", 95.0)
            .unwrap();
        assert!(!pos.check_for_sl(&bar(95.01, 120.0)));
        assert!(pos.check_for_sl(&bar(95.0, 120.0)));
        assert!(pos.check_for_sl(&bar(90.0, 99.0)));

        pos.close(t(1), 95.0, CloseReason::StopLoss).unwrap();
        pos.open(t(2), PositionSide::Short, 100.0, 100.0, "Open short", 105.0)
            .unwrap();
        assert!(!pos.check_for_sl(&bar(90.0, 104.99)));
        assert!(pos.check_for_sl(&bar(90.0, 105.0)));
    }

    #[test]
    fn info_survives_until_next_open() {
        let mut pos = Position::new(1.0, 0.0, 0.0);
        pos.open(t(0), PositionSide::Long, 100.0, 10.0, "Open long", 9.0)
            .unwrap();
        assert!(pos.info().is_none());
        pos.close(t(1), 11.0, CloseReason::OpposingCrossover).unwrap();
        assert!(pos.info().is_some());
        pos.open(t(2), PositionSide::Short, 50.0, 11.0, "Open short", 12.0)
            .unwrap();
        assert!(pos.info().is_none());
        assert_eq!(pos.initial_margin(), 50.0);
    }

    #[test]
    fn mark_to_market_matches_close_proceeds() {
        let mut pos = Position::new(3.0, 0.0002, 0.0006);
        pos.open(t(0), PositionSide::Short, 250.0, 80.0, "Open short", 84.0)
            .unwrap();
        let marked = pos.mark_to_market(76.0);
        pos.close(t(1), 76.0, CloseReason::OpposingCrossover).unwrap();
        assert_approx(marked, pos.initial_margin() + pos.net_pnl());
    }
}
