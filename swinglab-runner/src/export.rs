//! Export: CSV and JSON artifacts for completed runs.
//!
//! Per scenario, `save_artifacts` writes:
//! - `<strategy_id>_trades_info.csv`: the trade ledger
//! - `<strategy_id>_equity_record.csv`: the sampled equity curve
//! - `<strategy_id>_summary.json`: metadata, parameters and metrics
//!
//! `results_csv` renders one row per scenario for batch comparisons.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use swinglab_core::domain::{EquitySample, OpenPosition, TradeRecord};

use crate::metrics::PerformanceSummary;
use crate::runner::{BacktestResult, SCHEMA_VERSION};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade ledger as CSV, one row per completed round-trip.
pub fn trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "entry_time",
        "entry_price",
        "entry_reason",
        "exit_time",
        "exit_price",
        "close_reason",
        "initial_margin",
        "sl_price",
        "gross_pnl",
        "fees",
        "net_pnl",
        "open_balance",
        "close_balance",
    ])?;
    for t in trades {
        wtr.write_record([
            t.side.as_str(),
            &t.entry_time.format(TIME_FORMAT).to_string(),
            &format!("{:.6}", t.entry_price),
            &t.entry_reason,
            &t.exit_time.format(TIME_FORMAT).to_string(),
            &format!("{:.6}", t.exit_price),
            t.close_reason.as_str(),
            &format!("{:.2}", t.initial_margin),
            &format!("{:.6}", t.sl_price),
            &format!("{:.4}", t.gross_pnl),
            &format!("{:.4}", t.fees),
            &format!("{:.4}", t.net_pnl),
            &format!("{:.2}", t.open_balance),
            &format!("{:.2}", t.close_balance),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Equity curve as CSV with `time,equity` columns.
pub fn equity_csv(curve: &[EquitySample]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "equity"])?;
    for s in curve {
        wtr.write_record([
            s.time.format(TIME_FORMAT).to_string(),
            format!("{:.2}", s.equity),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One summary row per scenario.
pub fn results_csv(results: &[BacktestResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "strategy_id",
        "strategy_name",
        "symbol",
        "timeframe",
        "signal_rule",
        "bars",
        "trades",
        "win_rate",
        "stop_losses",
        "total_net_pnl",
        "total_fees",
        "final_balance",
        "final_equity",
        "return_pct",
        "max_drawdown_pct",
        "run_id",
    ])?;
    for r in results {
        let m = &r.metrics;
        wtr.write_record([
            r.strategy_id.as_str(),
            r.strategy_name.as_deref().unwrap_or(""),
            &r.symbol,
            r.timeframe.label(),
            r.params.signal_rule.name(),
            &r.bar_count.to_string(),
            &m.trade_count.to_string(),
            &format!("{:.4}", m.win_rate),
            &m.stop_loss_count.to_string(),
            &format!("{:.2}", m.total_net_pnl),
            &format!("{:.2}", m.total_fees),
            &format!("{:.2}", m.final_balance),
            &format!("{:.2}", m.final_equity),
            &format!("{:.2}", m.return_pct),
            &format!("{:.2}", m.max_drawdown_pct),
            &r.run_id,
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

/// Everything in a result except the ledger and the curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub run_id: String,
    pub strategy_id: String,
    pub strategy_name: Option<String>,
    pub symbol: String,
    pub timeframe: String,
    pub data_source: String,
    pub first_bar: String,
    pub last_bar: String,
    pub bar_count: usize,
    pub params: swinglab_core::scenario::ScenarioParams,
    pub metrics: PerformanceSummary,
    pub open_position: Option<OpenPosition>,
}

impl From<&BacktestResult> for RunSummary {
    fn from(r: &BacktestResult) -> Self {
        Self {
            schema_version: r.schema_version,
            run_id: r.run_id.clone(),
            strategy_id: r.strategy_id.clone(),
            strategy_name: r.strategy_name.clone(),
            symbol: r.symbol.clone(),
            timeframe: r.timeframe.label().to_string(),
            data_source: r.data_source.clone(),
            first_bar: r.first_bar.clone(),
            last_bar: r.last_bar.clone(),
            bar_count: r.bar_count,
            params: r.params.clone(),
            metrics: r.metrics.clone(),
            open_position: r.open_position.clone(),
        }
    }
}

pub fn summary_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(&RunSummary::from(result))
        .context("failed to serialize run summary to JSON")
}

/// Parse a summary, rejecting newer schema versions.
pub fn import_summary(json: &str) -> Result<RunSummary> {
    let summary: RunSummary =
        serde_json::from_str(json).context("failed to deserialize run summary")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the three per-scenario artifacts into `output_dir`. Returns their paths.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let stem = result.strategy_id.replace(['/', ':', '\\'], "-");
    let files = [
        (format!("{stem}_trades_info.csv"), trades_csv(&result.trades)?),
        (format!("{stem}_equity_record.csv"), equity_csv(&result.equity_curve)?),
        (format!("{stem}_summary.json"), summary_json(result)?),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = output_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Write `results.csv` for a batch into `output_dir`.
pub fn write_results(results: &[BacktestResult], output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let path = output_dir.join("results.csv");
    std::fs::write(&path, results_csv(results)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
