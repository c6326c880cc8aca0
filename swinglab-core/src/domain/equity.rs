//! Equity curve samples.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Mark-to-market equity at a sampling instant.
///
/// `equity = balance + mark_to_market(position, close)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub time: NaiveDateTime,
    pub equity: f64,
}
