//! Backtesting engine: the per-bar decision loop and equity sampling.
//!
//! The engine consumes a validated price series and a resolved scenario,
//! annotates signals once, then replays the bars in timestamp order.

pub mod equity;
pub mod loop_runner;
pub mod state;

pub use equity::sample_equity;
pub use loop_runner::{run_backtest, Backtest};
pub use state::{EngineConfig, ReentryGate, RunResult, RunState};
