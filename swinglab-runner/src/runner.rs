//! Backtest runner: wires scenario, price source, engine and metrics.
//!
//! Two entry points:
//! - `run_scenario()`: fetches the series from a `PriceSource`, then runs. Used by the CLI.
//! - `run_on_series()`: takes a pre-loaded series. No I/O.
//!
//! `run_batch()` runs many scenarios in parallel; each run owns its engine state.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use swinglab_core::data::{DataError, PriceSeries, PriceSource, Timeframe};
use swinglab_core::domain::{EquitySample, OpenPosition, TradeRecord};
use swinglab_core::engine::{run_backtest, EngineConfig};
use swinglab_core::scenario::ScenarioParams;
use swinglab_core::EngineError;

use crate::config::{RunId, Scenario};
use crate::metrics::PerformanceSummary;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("data error for {symbol}: {source}")]
    Data {
        symbol: String,
        #[source]
        source: DataError,
    },
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to derive run id: {0}")]
    RunId(#[from] serde_json::Error),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy_id: String,
    pub strategy_name: Option<String>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub data_source: String,
    pub first_bar: String,
    pub last_bar: String,
    pub params: ScenarioParams,
    pub metrics: PerformanceSummary,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquitySample>,
    pub bar_count: usize,
    pub open_position: Option<OpenPosition>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Outcome of one scenario inside a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub strategy_id: String,
    pub result: Result<BacktestResult, RunError>,
}

/// Fetch the scenario's series from `source` and run it.
pub fn run_scenario(
    scenario: &Scenario,
    source: &dyn PriceSource,
    config: EngineConfig,
) -> Result<BacktestResult, RunError> {
    info!(
        strategy_id = %scenario.strategy_id,
        symbol = %scenario.symbol,
        timeframe = %scenario.timeframe,
        source = source.name(),
        "running scenario"
    );
    let series = source
        .fetch(&scenario.symbol, scenario.timeframe, scenario.start, scenario.end)
        .map_err(|source| RunError::Data {
            symbol: scenario.symbol.clone(),
            source,
        })?;
    run_on_series(scenario, &series, source.name(), config)
}

/// Run a scenario on a pre-loaded series.
pub fn run_on_series(
    scenario: &Scenario,
    series: &PriceSeries,
    data_source: &str,
    config: EngineConfig,
) -> Result<BacktestResult, RunError> {
    let run_id = scenario.run_id()?;
    let result = run_backtest(series, &scenario.params, config)?;
    let metrics = PerformanceSummary::compute(&result, scenario.params.execution.initial_balance);

    info!(
        strategy_id = %scenario.strategy_id,
        trades = metrics.trade_count,
        final_equity = metrics.final_equity,
        return_pct = metrics.return_pct,
        "scenario complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        strategy_id: scenario.strategy_id.clone(),
        strategy_name: scenario.strategy_name.clone(),
        symbol: scenario.symbol.clone(),
        timeframe: scenario.timeframe,
        data_source: data_source.to_string(),
        first_bar: series.first_timestamp().to_string(),
        last_bar: series.last_timestamp().to_string(),
        params: scenario.params.clone(),
        metrics,
        trades: result.trades,
        equity_curve: result.equity_curve,
        bar_count: result.bar_count,
        open_position: result.open_position,
    })
}

/// Run every scenario in parallel. Outcomes are returned in input order.
///
/// A failing scenario does not stop the others.
pub fn run_batch(
    scenarios: &[Scenario],
    source: &dyn PriceSource,
    config: EngineConfig,
) -> Vec<BatchOutcome> {
    scenarios
        .par_iter()
        .map(|scenario| {
            let result = run_scenario(scenario, source, config);
            if let Err(e) = &result {
                warn!(strategy_id = %scenario.strategy_id, error = %e, "scenario failed");
            }
            BatchOutcome {
                strategy_id: scenario.strategy_id.clone(),
                result,
            }
        })
        .collect()
}
