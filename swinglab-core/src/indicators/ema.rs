//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = EMA[t-1] + alpha * (x[t] - EMA[t-1]), alpha = 2 / (span + 1).
//! Seed: the first finite observation. Values are NaN until `span` finite
//! observations have been seen, so leading NaNs in the input shift the warmup.

/// Compute the EMA of an arbitrary series.
///
/// A NaN after the seed taints every later value.
pub fn ema_of_series(values: &[f64], span: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if span == 0 {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev: Option<f64> = None;
    let mut seen = 0usize;

    for (i, &x) in values.iter().enumerate() {
        let ema = match prev {
            None if x.is_nan() => continue,
            None => x,
            Some(_) if x.is_nan() => return result,
            Some(p) => p + alpha * (x - p),
        };
        prev = Some(ema);
        seen += 1;
        if seen >= span {
            result[i] = ema;
        }
    }

    result
}
