//! SwingLab Runner: scenario files, price sources, batch runs and export.
//!
//! This crate builds on `swinglab-core` to provide:
//! - TOML scenario files resolved into validated parameters
//! - CSV price files on disk and a deterministic synthetic source
//! - Single and parallel batch runs with performance summaries
//! - Trade ledger, equity curve and summary artifacts

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use config::{find_scenario, load_scenarios, parse_scenarios, ConfigError, RunId, Scenario};
pub use data_loader::{CsvPriceSource, LoadError};
pub use export::{save_artifacts, write_results, RunSummary};
pub use metrics::PerformanceSummary;
pub use runner::{run_batch, run_on_series, run_scenario, BacktestResult, BatchOutcome, RunError};
pub use synthetic::SyntheticPriceSource;
