//! Scenario parameters: the resolved, immutable strategy configuration.
//!
//! Parsing raw configuration text is not this module's job; it receives typed
//! values and checks them once, before any bar is processed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::PositionSide;

/// Configuration errors. All are detected before the bar loop starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unsupported signal rule: {0}")]
    UnsupportedSignalRule(String),

    #[error("invalid direction mode '{0}': expected long, short or both")]
    InvalidDirectionMode(String),

    #[error("position size missing: set either position_size_percentage or position_size_fixed_amount")]
    MissingSizing,

    #[error("position size ambiguous: position_size_percentage and position_size_fixed_amount are both set")]
    AmbiguousSizing,

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// MACD-cross windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

/// Base average used by the envelope rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageType {
    Sma,
    Ema,
}

impl FromStr for AverageType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SMA" => Ok(AverageType::Sma),
            "EMA" => Ok(AverageType::Ema),
            _ => Err(ConfigError::UnsupportedSignalRule(s.to_string())),
        }
    }
}

/// Moving-average envelope: a base average with symmetric percentage bands.
///
/// `deviations` are fractions (0.05 = 5%); the first one drives entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeParams {
    pub average_type: AverageType,
    pub period: usize,
    pub deviations: Vec<f64>,
}

/// Signal rule variants, each carrying its own parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalRule {
    MacdCross(MacdParams),
    Envelope(EnvelopeParams),
}

impl SignalRule {
    pub fn name(&self) -> &'static str {
        match self {
            SignalRule::MacdCross(_) => "macd_cross",
            SignalRule::Envelope(_) => "envelope",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SignalRule::MacdCross(p) => {
                if p.fast == 0 || p.slow == 0 || p.signal == 0 {
                    return Err(invalid("macd", "windows must be >= 1"));
                }
                if p.fast >= p.slow {
                    return Err(invalid(
                        "macd",
                        format!("fast window {} must be < slow window {}", p.fast, p.slow),
                    ));
                }
            }
            SignalRule::Envelope(p) => {
                if p.period == 0 {
                    return Err(invalid("average_period", "must be >= 1"));
                }
                if p.deviations.is_empty() {
                    return Err(invalid("envelopes", "at least one deviation is required"));
                }
                if let Some(d) = p
                    .deviations
                    .iter()
                    .find(|d| !(d.is_finite() && **d > 0.0 && **d < 1.0))
                {
                    return Err(invalid("envelopes", format!("deviation {d} not in (0, 1)")));
                }
            }
        }
        Ok(())
    }
}

/// Which sides the strategy may enter. Exits are never gated by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionMode {
    Long,
    Short,
    Both,
}

impl DirectionMode {
    pub fn allows(&self, side: PositionSide) -> bool {
        matches!(
            (self, side),
            (DirectionMode::Both, _)
                | (DirectionMode::Long, PositionSide::Long)
                | (DirectionMode::Short, PositionSide::Short)
        )
    }
}

impl FromStr for DirectionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(DirectionMode::Long),
            "short" => Ok(DirectionMode::Short),
            "both" => Ok(DirectionMode::Both),
            other => Err(ConfigError::InvalidDirectionMode(other.to_string())),
        }
    }
}

impl fmt::Display for DirectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DirectionMode::Long => "long",
            DirectionMode::Short => "short",
            DirectionMode::Both => "both",
        })
    }
}

/// How much capital each entry commits. Exactly one method per scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "value", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Fraction of the current balance, in (0, 1].
    BalanceFraction(f64),
    /// Absolute currency amount.
    FixedAmount(f64),
}

impl PositionSizing {
    /// Resolve the two optional sizing inputs into exactly one method.
    pub fn from_options(fraction: Option<f64>, fixed: Option<f64>) -> Result<Self, ConfigError> {
        match (fraction, fixed) {
            (Some(f), None) => Ok(PositionSizing::BalanceFraction(f)),
            (None, Some(a)) => Ok(PositionSizing::FixedAmount(a)),
            (None, None) => Err(ConfigError::MissingSizing),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousSizing),
        }
    }

    /// Margin to commit given the current balance.
    pub fn margin(&self, balance: f64) -> f64 {
        match *self {
            PositionSizing::BalanceFraction(f) => balance * f,
            PositionSizing::FixedAmount(a) => a,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            PositionSizing::BalanceFraction(f) if !(f.is_finite() && f > 0.0 && f <= 1.0) => Err(
                invalid("position_size_percentage", format!("{f} not in (0, 1]")),
            ),
            PositionSizing::FixedAmount(a) if !(a.is_finite() && a > 0.0) => Err(invalid(
                "position_size_fixed_amount",
                format!("{a} must be positive"),
            )),
            _ => Ok(()),
        }
    }
}

/// Account settings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    pub initial_balance: f64,
    pub leverage: f64,
    pub open_fee_rate: f64,
    pub close_fee_rate: f64,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            initial_balance: 1000.0,
            leverage: 1.0,
            open_fee_rate: 0.0002,
            close_fee_rate: 0.0006,
        }
    }
}

impl ExecutionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return Err(invalid(
                "initial_balance",
                format!("{} must be positive", self.initial_balance),
            ));
        }
        if !(self.leverage.is_finite() && self.leverage >= 1.0) {
            return Err(invalid("leverage", format!("{} must be >= 1", self.leverage)));
        }
        for (name, rate) in [
            ("open_fee_rate", self.open_fee_rate),
            ("close_fee_rate", self.close_fee_rate),
        ] {
            if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
                return Err(invalid(name, format!("{rate} not in [0, 1)")));
            }
        }
        Ok(())
    }
}

/// Fully resolved strategy configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub signal_rule: SignalRule,
    pub stop_loss_pct: f64,
    pub direction_mode: DirectionMode,
    pub sizing: PositionSizing,
    pub execution: ExecutionParams,
}

impl ScenarioParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signal_rule.validate()?;
        if !(self.stop_loss_pct.is_finite() && self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0)
        {
            return Err(invalid(
                "stop_loss_pct",
                format!("{} not in (0, 1)", self.stop_loss_pct),
            ));
        }
        self.sizing.validate()?;
        self.execution.validate()
    }

    /// Stop trigger fixed at entry: `price × (1 − pct)` for longs, `price × (1 + pct)` for shorts.
    pub fn stop_price(&self, side: PositionSide, entry_price: f64) -> f64 {
        match side {
            PositionSide::Long => entry_price * (1.0 - self.stop_loss_pct),
            PositionSide::Short => entry_price * (1.0 + self.stop_loss_pct),
        }
    }
}
