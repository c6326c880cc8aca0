//! Equity sampling at a fixed simulated-time cadence.

use chrono::{Duration, NaiveDateTime};

use crate::domain::{EquitySample, Position};

/// Append an equity sample if `cadence` has elapsed since `last_sample`.
///
/// `equity = balance + position.mark_to_market(mark_price)`. The first call
/// (`last_sample == None`) always samples. Returns the time of the most recent
/// sample, which the caller threads into the next call.
pub fn sample_equity(
    time: NaiveDateTime,
    position: &Position,
    balance: f64,
    mark_price: f64,
    last_sample: Option<NaiveDateTime>,
    cadence: Duration,
    curve: &mut Vec<EquitySample>,
) -> Option<NaiveDateTime> {
    let due = match last_sample {
        Some(last) => time - last >= cadence,
        None => true,
    };
    if !due {
        return last_sample;
    }
    curve.push(EquitySample {
        time,
        equity: balance + position.mark_to_market(mark_price),
    });
    Some(time)
}
