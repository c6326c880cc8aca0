//! CSV price files on disk.
//!
//! Layout: `<root>/<timeframe>/<symbol>.csv`, with `/` and `:` in the symbol
//! replaced by `-` (so `BTC/USDT:USDT` lives in `BTC-USDT-USDT.csv`).
//! Required columns: `date,open,high,low,close,volume`; extra columns are ignored.
//!
//! Rows are sorted by date and duplicate dates are dropped (first row wins)
//! before the window filter is applied.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use swinglab_core::data::{DataError, PriceSeries, PriceSource, Timeframe};
use swinglab_core::domain::Bar;

use crate::config::parse_timestamp;

/// Errors from reading a price file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("price file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}, row {row}: unparseable date '{value}'")]
    InvalidDate {
        path: PathBuf,
        row: usize,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Price source backed by a directory of CSV files.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    root: PathBuf,
}

impl CsvPriceSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the file holding `symbol` at `timeframe`.
    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        let file = format!("{}.csv", symbol.replace(['/', ':'], "-"));
        self.root.join(timeframe.label()).join(file)
    }

    /// Read every row of a price file, sorted and de-duplicated by date.
    pub fn read_bars(path: &Path) -> Result<Vec<Bar>, LoadError> {
        if !path.exists() {
            return Err(LoadError::Missing(path.to_path_buf()));
        }
        let csv_err = |source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;

        let mut bars = Vec::new();
        for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(csv_err)?;
            let timestamp =
                parse_timestamp(row.date.trim(), false).ok_or_else(|| LoadError::InvalidDate {
                    path: path.to_path_buf(),
                    row: i + 1,
                    value: row.date.clone(),
                })?;
            bars.push(Bar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        // stable sort keeps file order among equal dates, so dedup keeps the first
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

/// Keep bars with `start <= timestamp <= end`.
pub fn filter_window(
    bars: Vec<Bar>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| start.map_or(true, |s| b.timestamp >= s))
        .filter(|b| end.map_or(true, |e| b.timestamp <= e))
        .collect()
}

impl PriceSource for CsvPriceSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, DataError> {
        let path = self.path_for(symbol, timeframe);
        let no_data = |reason: String| DataError::NoData {
            symbol: symbol.to_string(),
            timeframe,
            reason,
        };

        let all = Self::read_bars(&path).map_err(|e| no_data(e.to_string()))?;
        let total = all.len();
        let bars = filter_window(all, start, end);
        if bars.is_empty() {
            return Err(no_data(format!(
                "none of the {total} bars in {} fall inside the requested window",
                path.display()
            )));
        }
        debug!(
            symbol,
            timeframe = %timeframe,
            path = %path.display(),
            bars = bars.len(),
            "loaded price file"
        );
        PriceSeries::new(bars)
    }
}
