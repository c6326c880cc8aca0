//! Bar-by-bar decision loop: the heart of the backtesting engine.
//!
//! Four steps per bar, in this order:
//! 1. Re-entry gate recovery after a stop-loss
//! 2. Exit: opposing entry signal (fill at close), else stop-loss (fill at stop price)
//! 3. Entry: only if flat, nothing closed this bar, gate open and side allowed
//! 4. Equity sampling at the configured cadence

use tracing::{debug, info, warn};

use crate::data::PriceSeries;
use crate::domain::{Bar, CloseReason, PositionSide};
use crate::error::EngineError;
use crate::scenario::{ConfigError, ExecutionParams, ScenarioParams};
use crate::signals::{self, BarSignals, SignalAnnotation};

use super::equity::sample_equity;
use super::state::{EngineConfig, RunResult, RunState};

/// A validated, annotated backtest ready to run.
///
/// Everything that can fail for configuration reasons fails in `new`, before
/// any bar is processed. The signal rule is dispatched once, here.
#[derive(Debug, Clone)]
pub struct Backtest<'a> {
    series: &'a PriceSeries,
    params: &'a ScenarioParams,
    annotation: SignalAnnotation,
    config: EngineConfig,
}

impl<'a> Backtest<'a> {
    pub fn new(
        series: &'a PriceSeries,
        params: &'a ScenarioParams,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        let annotation = signals::annotate(series, &params.signal_rule);
        debug!(
            rule = params.signal_rule.name(),
            long_entries = annotation.entry_count(PositionSide::Long),
            short_entries = annotation.entry_count(PositionSide::Short),
            "signals annotated"
        );
        Self::from_annotation(series, params, annotation, config)
    }

    /// Build a backtest over precomputed signal columns.
    pub fn from_annotation(
        series: &'a PriceSeries,
        params: &'a ScenarioParams,
        annotation: SignalAnnotation,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        if config.equity_cadence <= chrono::Duration::zero() {
            return Err(ConfigError::InvalidParameter {
                name: "equity_cadence",
                reason: format!("{} must be positive", config.equity_cadence),
            }
            .into());
        }
        if annotation.len() != series.len() {
            return Err(EngineError::AnnotationLength {
                expected: series.len(),
                actual: annotation.len(),
            });
        }
        Ok(Self {
            series,
            params,
            annotation,
            config,
        })
    }

    pub fn annotation(&self) -> &SignalAnnotation {
        &self.annotation
    }

    /// Replay the series with the given account settings.
    pub fn run(&self, exec: &ExecutionParams) -> Result<RunResult, EngineError> {
        exec.validate()?;
        let mut state = RunState::new(exec);

        for (i, bar) in self.series.bars().iter().enumerate() {
            let signals = self.annotation.at(i);

            // ─── Step 1: gate recovery ───
            if state.gate.recover(&signals) {
                debug!(time = %bar.timestamp, "re-entry gate reopened");
            }

            // ─── Step 2: exit ───
            let closed = self.evaluate_exit(&mut state, bar, &signals)?;

            // ─── Step 3: entry ───
            if !closed {
                self.evaluate_entry(&mut state, bar, &signals)?;
            }

            // ─── Step 4: equity ───
            state.last_sample = sample_equity(
                bar.timestamp,
                &state.position,
                state.balance,
                bar.close,
                state.last_sample,
                self.config.equity_cadence,
                &mut state.equity_curve,
            );
            state.verify_balance();
        }

        let final_equity = state
            .equity_curve
            .last()
            .map(|s| s.equity)
            .unwrap_or(state.balance);
        info!(
            bars = self.series.len(),
            trades = state.trades.len(),
            final_balance = state.balance,
            final_equity,
            "backtest complete"
        );

        Ok(RunResult {
            open_position: state.position.open_snapshot(),
            trades: state.trades,
            equity_curve: state.equity_curve,
            final_balance: state.balance,
            final_equity,
            bar_count: self.series.len(),
        })
    }

    /// Close the open position if this bar calls for it. Returns true if it did.
    fn evaluate_exit(
        &self,
        state: &mut RunState,
        bar: &Bar,
        signals: &BarSignals,
    ) -> Result<bool, EngineError> {
        let Some(side) = state.position.side() else {
            return Ok(false);
        };

        let (price, reason) = if signals.entry(side.opposite()) {
            (bar.close, CloseReason::OpposingCrossover)
        } else if state.position.check_for_sl(bar) {
            match state.position.sl_price() {
                Some(sl) => (sl, CloseReason::StopLoss),
                None => return Ok(false),
            }
        } else {
            return Ok(false);
        };

        let record = state.close_position(bar.timestamp, price, reason)?;
        debug!(
            time = %bar.timestamp,
            side = %side,
            price,
            reason = %reason,
            net_pnl = record.net_pnl,
            balance = record.close_balance,
            "position closed"
        );

        if reason == CloseReason::StopLoss {
            state.gate.suppress(side);
        }
        Ok(true)
    }

    fn evaluate_entry(
        &self,
        state: &mut RunState,
        bar: &Bar,
        signals: &BarSignals,
    ) -> Result<(), EngineError> {
        if state.position.is_open() || !state.gate.is_open() {
            return Ok(());
        }
        let mode = self.params.direction_mode;
        let side = if signals.long_entry && mode.allows(PositionSide::Long) {
            PositionSide::Long
        } else if signals.short_entry && mode.allows(PositionSide::Short) {
            PositionSide::Short
        } else {
            return Ok(());
        };

        let margin = self.params.sizing.margin(state.balance);
        if !(margin > 0.0 && margin <= state.balance) {
            warn!(
                time = %bar.timestamp,
                side = %side,
                margin,
                balance = state.balance,
                "entry skipped: margin not fundable"
            );
            return Ok(());
        }

        let sl_price = self.params.stop_price(side, bar.close);
        let reason = format!("{} {}", self.params.signal_rule.name(), side);
        state.open_position(bar.timestamp, side, margin, bar.close, &reason, sl_price)?;
        debug!(
            time = %bar.timestamp,
            side = %side,
            price = bar.close,
            margin,
            sl_price,
            "position opened"
        );
        Ok(())
    }
}

/// Validate, annotate and run a scenario with its own execution settings.
pub fn run_backtest(
    series: &PriceSeries,
    params: &ScenarioParams,
    config: EngineConfig,
) -> Result<RunResult, EngineError> {
    Backtest::new(series, params, config)?.run(&params.execution)
}
