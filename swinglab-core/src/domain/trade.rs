//! TradeRecord: one completed round-trip in the trade ledger.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{PositionInfo, PositionSide};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The entry signal for the opposite side fired; filled at the bar's close.
    OpposingCrossover,
    /// The bar's range reached the stop trigger; filled at the stop price.
    StopLoss,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::OpposingCrossover => "opposing crossover",
            CloseReason::StopLoss => "stop loss",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot taken at each close. The ledger is append-only.
///
/// `open_balance` is the balance just before the close was settled and
/// `close_balance` the balance right after, so
/// `close_balance == open_balance + initial_margin + net_pnl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: PositionSide,

    // ── Entry ──
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub entry_reason: String,

    // ── Exit ──
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub close_reason: CloseReason,

    // ── Accounting ──
    pub initial_margin: f64,
    pub sl_price: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub open_balance: f64,
    pub close_balance: f64,
}

impl TradeRecord {
    pub fn from_info(info: PositionInfo, open_balance: f64, close_balance: f64) -> Self {
        Self {
            side: info.side,
            entry_time: info.entry_time,
            entry_price: info.entry_price,
            entry_reason: info.entry_reason,
            exit_time: info.exit_time,
            exit_price: info.exit_price,
            close_reason: info.close_reason,
            initial_margin: info.initial_margin,
            sl_price: info.sl_price,
            gross_pnl: info.gross_pnl,
            fees: info.open_fee + info.close_fee,
            net_pnl: info.net_pnl,
            open_balance,
            close_balance,
        }
    }

    /// Net PnL as a fraction of committed margin.
    pub fn return_on_margin(&self) -> f64 {
        if self.initial_margin == 0.0 {
            return 0.0;
        }
        self.net_pnl / self.initial_margin
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}
