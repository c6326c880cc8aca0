//! SwingLab CLI: list, run and batch commands over a TOML scenario file.
//!
//! Commands:
//! - `list`: print the scenarios a file defines
//! - `run`: backtest one scenario and save its artifacts
//! - `batch`: backtest every scenario in parallel and write `results.csv`
//!
//! Logs go to stderr; `RUST_LOG` overrides `--log-level`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use swinglab_core::data::PriceSource;
use swinglab_core::engine::EngineConfig;
use swinglab_runner::{
    find_scenario, load_scenarios, run_batch, run_scenario, save_artifacts, write_results,
    BacktestResult, CsvPriceSource, SyntheticPriceSource,
};

#[derive(Parser)]
#[command(
    name = "swinglab",
    about = "SwingLab CLI: bar-by-bar swing strategy backtester"
)]
struct Cli {
    /// Base log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the scenarios defined in a file.
    List {
        /// Path to the TOML scenario file.
        #[arg(long, default_value = "scenarios.toml")]
        scenarios: PathBuf,
    },
    /// Backtest one scenario by strategy_id.
    Run {
        /// Strategy id to run.
        #[arg(long)]
        id: String,

        #[command(flatten)]
        opts: RunOpts,
    },
    /// Backtest every scenario in the file.
    Batch {
        #[command(flatten)]
        opts: RunOpts,
    },
}

#[derive(Args)]
struct RunOpts {
    /// Path to the TOML scenario file.
    #[arg(long, default_value = "scenarios.toml")]
    scenarios: PathBuf,

    /// Root of the CSV price files (`<dir>/<timeframe>/<symbol>.csv`).
    #[arg(long, default_value = "data", conflicts_with = "synthetic")]
    data_dir: PathBuf,

    /// Use a deterministic random walk instead of CSV files.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Number of synthetic bars per scenario.
    #[arg(long, default_value_t = 1_000, requires = "synthetic")]
    bars: usize,

    /// Output directory for artifacts.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Minimum simulated hours between equity samples.
    #[arg(long, default_value_t = 6)]
    cadence_hours: i64,
}

impl RunOpts {
    fn source(&self) -> Box<dyn PriceSource> {
        if self.synthetic {
            Box::new(SyntheticPriceSource::with_bars(self.bars))
        } else {
            Box::new(CsvPriceSource::new(&self.data_dir))
        }
    }

    fn engine_config(&self) -> Result<EngineConfig> {
        if self.cadence_hours <= 0 {
            bail!("--cadence-hours must be positive, got {}", self.cadence_hours);
        }
        Ok(EngineConfig::with_cadence(Duration::hours(self.cadence_hours)))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::List { scenarios } => run_list(&scenarios),
        Commands::Run { id, opts } => run_one(&id, &opts),
        Commands::Batch { opts } => run_all(&opts),
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn run_list(path: &Path) -> Result<()> {
    let scenarios = load_scenarios(path)?;
    if scenarios.is_empty() {
        println!("No scenarios in {}", path.display());
        return Ok(());
    }
    println!(
        "{:<24} {:<14} {:<6} {:<11} {:<6} NAME",
        "ID", "SYMBOL", "TF", "RULE", "MODE"
    );
    for s in &scenarios {
        println!(
            "{:<24} {:<14} {:<6} {:<11} {:<6} {}",
            s.strategy_id,
            s.symbol,
            s.timeframe,
            s.params.signal_rule.name(),
            s.params.direction_mode,
            s.display_name()
        );
    }
    Ok(())
}

fn run_one(id: &str, opts: &RunOpts) -> Result<()> {
    let scenarios = load_scenarios(&opts.scenarios)?;
    let scenario = find_scenario(&scenarios, id)?;
    let source = opts.source();

    let result = run_scenario(scenario, source.as_ref(), opts.engine_config()?)
        .with_context(|| format!("scenario '{id}' failed"))?;

    print_summary(&result);
    let written = save_artifacts(&result, &opts.output_dir)?;
    for path in written {
        println!("Saved: {}", path.display());
    }
    Ok(())
}

fn run_all(opts: &RunOpts) -> Result<()> {
    let scenarios = load_scenarios(&opts.scenarios)?;
    let source = opts.source();
    let config = opts.engine_config()?;
    info!(count = scenarios.len(), source = source.name(), "starting batch");

    let outcomes = run_batch(&scenarios, source.as_ref(), config);

    let mut results: Vec<BacktestResult> = Vec::with_capacity(outcomes.len());
    let mut failed = 0usize;
    for outcome in outcomes {
        match outcome.result {
            Ok(result) => {
                save_artifacts(&result, &opts.output_dir)?;
                results.push(result);
            }
            Err(e) => {
                error!(strategy_id = %outcome.strategy_id, error = %e, "scenario failed");
                failed += 1;
            }
        }
    }

    for result in &results {
        print_summary(result);
    }
    let table = write_results(&results, &opts.output_dir)?;
    println!("Results table: {}", table.display());

    if failed > 0 {
        bail!("{failed} of {} scenario(s) failed", scenarios.len());
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== {} ===", result.strategy_name.as_deref().unwrap_or(&result.strategy_id));
    println!("Symbol:         {} ({})", result.symbol, result.timeframe);
    println!("Period:         {} to {}", result.first_bar, result.last_bar);
    println!("Bars:           {}", result.bar_count);
    println!("Rule:           {}", result.params.signal_rule.name());
    println!("Trades:         {} ({} stop losses)", m.trade_count, m.stop_loss_count);
    println!();
    println!("--- Performance ---");
    println!("Net PnL:        {:.2}", m.total_net_pnl);
    println!("Fees:           {:.2}", m.total_fees);
    println!("Final Balance:  {:.2}", m.final_balance);
    println!("Final Equity:   {:.2}", m.final_equity);
    println!("Return:         {:.2}%", m.return_pct);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown_pct);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Avg Ret/Margin: {:.2}%", m.avg_return_on_margin * 100.0);
    if let Some(open) = &result.open_position {
        println!("Open Position:  {} since {}", open.side, open.entry_time);
    }
    if result.data_source == "synthetic" {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
