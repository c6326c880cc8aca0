//! Performance summary: pure functions over the ledger and equity curve.

use serde::{Deserialize, Serialize};
use swinglab_core::domain::{CloseReason, EquitySample, TradeRecord};
use swinglab_core::engine::RunResult;

/// Headline statistics of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    /// Fraction of closed trades with positive net PnL.
    pub win_rate: f64,
    pub stop_loss_count: usize,
    /// Mean net PnL per unit of committed margin; 0.0 with no trades.
    pub avg_return_on_margin: f64,
    pub total_net_pnl: f64,
    pub total_fees: f64,
    pub final_balance: f64,
    pub final_equity: f64,
    /// `(final_equity − initial_balance) / initial_balance × 100`.
    pub return_pct: f64,
    /// Largest peak-to-trough fall of the sampled equity, in percent.
    pub max_drawdown_pct: f64,
}

impl PerformanceSummary {
    pub fn compute(result: &RunResult, initial_balance: f64) -> Self {
        let trades = &result.trades;
        let wins = trades.iter().filter(|t| t.is_winner()).count();
        Self {
            trade_count: trades.len(),
            wins,
            losses: trades.len() - wins,
            win_rate: win_rate(trades),
            stop_loss_count: trades
                .iter()
                .filter(|t| t.close_reason == CloseReason::StopLoss)
                .count(),
            avg_return_on_margin: avg_return_on_margin(trades),
            total_net_pnl: result.total_net_pnl(),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            final_balance: result.final_balance,
            final_equity: result.final_equity,
            return_pct: return_pct(initial_balance, result.final_equity),
            max_drawdown_pct: max_drawdown(&result.equity_curve) * 100.0,
        }
    }
}

/// Fraction of winning trades; 0.0 with no trades.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

pub fn avg_return_on_margin(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(TradeRecord::return_on_margin).sum::<f64>() / trades.len() as f64
}

pub fn return_pct(initial: f64, final_equity: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    (final_equity - initial) / initial * 100.0
}

/// Maximum drawdown as a positive fraction of the running peak.
pub fn max_drawdown(curve: &[EquitySample]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for s in curve {
        peak = peak.max(s.equity);
        if peak > 0.0 {
            worst = worst.max((peak - s.equity) / peak);
        }
    }
    worst
}
