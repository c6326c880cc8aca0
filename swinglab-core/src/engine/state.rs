//! Engine configuration, mutable run state, and run result types.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CloseReason, EquitySample, OpenPosition, Position, PositionError, PositionSide, TradeRecord,
};
use crate::scenario::ExecutionParams;
use crate::signals::BarSignals;

/// Configuration for a single backtest run, independent of the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Minimum simulated time between two equity samples.
    pub equity_cadence: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            equity_cadence: Duration::hours(6),
        }
    }
}

impl EngineConfig {
    pub fn with_cadence(equity_cadence: Duration) -> Self {
        Self { equity_cadence }
    }
}

/// Entry suppression after a stop-loss.
///
/// A stop on side S closes the gate; it reopens on the first bar where S's
/// bias (e.g. MACD above signal for a long) holds again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReentryGate {
    stopped_side: Option<PositionSide>,
}

impl ReentryGate {
    pub fn is_open(&self) -> bool {
        self.stopped_side.is_none()
    }

    pub fn stopped_side(&self) -> Option<PositionSide> {
        self.stopped_side
    }

    pub fn suppress(&mut self, side: PositionSide) {
        self.stopped_side = Some(side);
    }

    /// Reopen the gate if this bar's bias is back in the stopped side's favor.
    /// Returns true when the gate was reopened by this call.
    pub fn recover(&mut self, signals: &BarSignals) -> bool {
        match self.stopped_side {
            Some(side) if signals.bias(side) => {
                self.stopped_side = None;
                true
            }
            _ => false,
        }
    }
}

/// Mutable state owned by the loop for the duration of one run.
#[derive(Debug, Clone)]
pub struct RunState {
    pub initial_balance: f64,
    pub balance: f64,
    pub position: Position,
    pub gate: ReentryGate,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquitySample>,
    pub last_sample: Option<NaiveDateTime>,
    realized_pnl: f64,
    /// Largest capital seen so far; rounding error in the balance scales with it.
    peak_capital: f64,
}

impl RunState {
    pub fn new(exec: &ExecutionParams) -> Self {
        Self {
            initial_balance: exec.initial_balance,
            balance: exec.initial_balance,
            position: Position::new(exec.leverage, exec.open_fee_rate, exec.close_fee_rate),
            gate: ReentryGate::default(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            last_sample: None,
            realized_pnl: 0.0,
            peak_capital: exec.initial_balance.abs(),
        }
    }

    /// Commit `margin` from the balance and open at `price`.
    pub fn open_position(
        &mut self,
        time: NaiveDateTime,
        side: PositionSide,
        margin: f64,
        price: f64,
        reason: &str,
        sl_price: f64,
    ) -> Result<(), PositionError> {
        self.position.open(time, side, margin, price, reason, sl_price)?;
        self.balance -= margin;
        Ok(())
    }

    /// Close at `price`, credit margin plus net PnL, and append to the ledger.
    pub fn close_position(
        &mut self,
        time: NaiveDateTime,
        price: f64,
        reason: CloseReason,
    ) -> Result<&TradeRecord, PositionError> {
        self.position.close(time, price, reason)?;
        let info = self.position.info().ok_or(PositionError::NotOpen { time })?;

        let open_balance = self.balance;
        self.balance += info.initial_margin + info.net_pnl;
        self.realized_pnl += info.net_pnl;
        self.peak_capital = self.peak_capital.max(self.balance.abs());
        self.trades
            .push(TradeRecord::from_info(info, open_balance, self.balance));
        let idx = self.trades.len() - 1;
        Ok(&self.trades[idx])
    }

    /// Verify capital conservation: balance == initial + realized − committed margin.
    ///
    /// The tolerance is relative to the largest capital the run has held.
    /// Returns the current balance. Panics in debug builds if the identity is violated.
    pub fn verify_balance(&self) -> f64 {
        let committed = if self.position.is_open() {
            self.position.initial_margin()
        } else {
            0.0
        };
        let expected = self.initial_balance + self.realized_pnl - committed;
        let scale = self
            .peak_capital
            .max(self.balance.abs())
            .max(expected.abs())
            .max(1.0);
        debug_assert!(
            (self.balance - expected).abs() <= 1e-9 * scale,
            "capital conservation violated: balance={}, initial={} + realized={} - committed={committed} = {expected}",
            self.balance,
            self.initial_balance,
            self.realized_pnl
        );
        self.balance
    }
}

/// Result of a complete backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Completed round-trips, in close order.
    pub trades: Vec<TradeRecord>,
    /// Equity sampled at the configured cadence.
    pub equity_curve: Vec<EquitySample>,
    pub final_balance: f64,
    /// Last sampled equity value.
    pub final_equity: f64,
    pub bar_count: usize,
    /// Exposure still open when the series ran out. Not part of `trades`.
    pub open_position: Option<OpenPosition>,
}

impl RunResult {
    pub fn total_net_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.net_pnl).sum()
    }
}
