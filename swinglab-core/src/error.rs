//! Engine-level error type.

use thiserror::Error;

use crate::domain::PositionError;
use crate::scenario::ConfigError;

/// Why a backtest could not be built or did not complete.
///
/// `Config` is raised before the first bar. `Invariant` means the engine
/// itself misbehaved; the run is aborted rather than continued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("signal annotation covers {actual} bars but the series has {expected}")]
    AnnotationLength { expected: usize, actual: usize },

    #[error("position invariant violated: {0}")]
    Invariant(#[from] PositionError),
}
