//! SwingLab Core: single-position strategy backtesting.
//!
//! This crate contains the simulation engine and everything it reads:
//! - Domain types (bars, position state machine, trade records, equity samples)
//! - Price series validation and the `PriceSource` interface
//! - Indicators (EMA, SMA, MACD) and edge-triggered signal annotation
//! - Scenario parameters, validated before any bar is processed
//! - The bar-by-bar decision loop and the equity sampler
//!
//! No I/O happens here. Loading data and writing results live in `swinglab-runner`.

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod scenario;
pub mod signals;

pub use error::EngineError;
