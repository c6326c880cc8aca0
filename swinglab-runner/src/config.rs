//! Scenario files: TOML `[[scenario]]` tables resolved into validated parameters.
//!
//! Resolution is eager: every scenario in a file is checked when the file is
//! loaded, so a typo in the last table fails before any data is read.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use swinglab_core::data::Timeframe;
use swinglab_core::scenario::{
    self, AverageType, DirectionMode, EnvelopeParams, ExecutionParams, MacdParams,
    PositionSizing, ScenarioParams, SignalRule,
};

/// Deterministic identifier of a resolved scenario (BLAKE3 hex).
pub type RunId = String;

/// Errors from reading and resolving scenario files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("scenario '{id}': {source}")]
    Invalid {
        id: String,
        #[source]
        source: scenario::ConfigError,
    },

    #[error("scenario '{id}': unsupported timeframe '{timeframe}'")]
    UnsupportedTimeframe { id: String, timeframe: String },

    #[error("scenario '{id}': invalid {field} '{value}' (expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)")]
    InvalidDate {
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("duplicate strategy_id '{0}'")]
    DuplicateId(String),

    #[error("no scenario with strategy_id '{0}'")]
    NotFound(String),
}

/// One `[[scenario]]` table as written in the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioEntry {
    pub strategy_id: String,
    pub strategy_name: Option<String>,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_average_type")]
    pub average_type: String,
    pub fast_ma: Option<usize>,
    pub slow_ma: Option<usize>,
    pub signal_ma: Option<usize>,
    pub average_period: Option<usize>,
    pub envelopes: Option<Vec<f64>>,
    pub stop_loss_pct: f64,
    pub mode: Option<String>,
    /// Percent of the current balance, in (0, 100].
    pub position_size_percentage: Option<f64>,
    pub position_size_fixed_amount: Option<f64>,
    pub initial_balance: Option<f64>,
    pub leverage: Option<f64>,
    pub open_fee_rate: Option<f64>,
    pub close_fee_rate: Option<f64>,
}

fn default_average_type() -> String {
    "MACD".to_string()
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    scenario: Vec<ScenarioEntry>,
}

/// A fully resolved scenario: market selection plus validated strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub strategy_id: String,
    pub strategy_name: Option<String>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub params: ScenarioParams,
}

impl Scenario {
    /// Deterministic hash of everything that determines the run's output.
    ///
    /// Two scenarios with identical content share a `RunId`.
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    pub fn display_name(&self) -> &str {
        self.strategy_name.as_deref().unwrap_or(&self.strategy_id)
    }
}

impl ScenarioEntry {
    /// Resolve and validate into a [`Scenario`].
    pub fn resolve(self) -> Result<Scenario, ConfigError> {
        let id = self.strategy_id.clone();
        let invalid = |source: scenario::ConfigError| ConfigError::Invalid {
            id: id.clone(),
            source,
        };

        let timeframe = Timeframe::from_str(&self.timeframe).map_err(|_| {
            ConfigError::UnsupportedTimeframe {
                id: id.clone(),
                timeframe: self.timeframe.clone(),
            }
        })?;
        let start = parse_bound(&id, "start_date", self.start_date.as_deref(), false)?;
        let end = parse_bound(&id, "end_date", self.end_date.as_deref(), true)?;

        let signal_rule = self.signal_rule().map_err(invalid)?;
        let direction_mode = match self.mode.as_deref() {
            Some(m) => DirectionMode::from_str(m).map_err(invalid)?,
            None => DirectionMode::Both,
        };
        let sizing = self.sizing().map_err(invalid)?;

        let defaults = ExecutionParams::default();
        let execution = ExecutionParams {
            initial_balance: self.initial_balance.unwrap_or(defaults.initial_balance),
            leverage: self.leverage.unwrap_or(defaults.leverage),
            open_fee_rate: self.open_fee_rate.unwrap_or(defaults.open_fee_rate),
            close_fee_rate: self.close_fee_rate.unwrap_or(defaults.close_fee_rate),
        };

        let params = ScenarioParams {
            signal_rule,
            stop_loss_pct: self.stop_loss_pct,
            direction_mode,
            sizing,
            execution,
        };
        params.validate().map_err(invalid)?;

        Ok(Scenario {
            strategy_id: self.strategy_id,
            strategy_name: self.strategy_name,
            symbol: self.symbol,
            timeframe,
            start,
            end,
            params,
        })
    }

    fn signal_rule(&self) -> Result<SignalRule, scenario::ConfigError> {
        if self.average_type.eq_ignore_ascii_case("MACD") {
            self.reject_unused(&[
                ("average_period", self.average_period.is_some()),
                ("envelopes", self.envelopes.is_some()),
            ])?;
            let d = MacdParams::default();
            return Ok(SignalRule::MacdCross(MacdParams {
                fast: self.fast_ma.unwrap_or(d.fast),
                slow: self.slow_ma.unwrap_or(d.slow),
                signal: self.signal_ma.unwrap_or(d.signal),
            }));
        }
        let average_type = AverageType::from_str(&self.average_type)?;
        self.reject_unused(&[
            ("fast_ma", self.fast_ma.is_some()),
            ("slow_ma", self.slow_ma.is_some()),
            ("signal_ma", self.signal_ma.is_some()),
        ])?;
        let period = self
            .average_period
            .ok_or_else(|| required("average_period", &self.average_type))?;
        let deviations = self
            .envelopes
            .clone()
            .ok_or_else(|| required("envelopes", &self.average_type))?;
        Ok(SignalRule::Envelope(EnvelopeParams {
            average_type,
            period,
            deviations,
        }))
    }

    /// Keys of the other signal rule are an error, not a silent no-op.
    fn reject_unused(&self, keys: &[(&'static str, bool)]) -> Result<(), scenario::ConfigError> {
        match keys.iter().find(|(_, set)| *set) {
            Some(&(name, _)) => Err(scenario::ConfigError::InvalidParameter {
                name,
                reason: format!("not used by average_type {}", self.average_type),
            }),
            None => Ok(()),
        }
    }

    fn sizing(&self) -> Result<PositionSizing, scenario::ConfigError> {
        if let Some(pct) = self.position_size_percentage {
            if !(pct.is_finite() && pct > 0.0 && pct <= 100.0) {
                return Err(scenario::ConfigError::InvalidParameter {
                    name: "position_size_percentage",
                    reason: format!("{pct} not in (0, 100]"),
                });
            }
        }
        PositionSizing::from_options(
            self.position_size_percentage.map(|p| p / 100.0),
            self.position_size_fixed_amount,
        )
    }
}

fn required(name: &'static str, average_type: &str) -> scenario::ConfigError {
    scenario::ConfigError::InvalidParameter {
        name,
        reason: format!("required for average_type {average_type}"),
    }
}

/// Parse a date bound. Date-only end bounds extend to the end of that day.
fn parse_bound(
    id: &str,
    field: &'static str,
    value: Option<&str>,
    end_of_day: bool,
) -> Result<Option<NaiveDateTime>, ConfigError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    parse_timestamp(value, end_of_day)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidDate {
            id: id.to_string(),
            field,
            value: value.to_string(),
        })
}

/// `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`.
pub(crate) fn parse_timestamp(value: &str, end_of_day: bool) -> Option<NaiveDateTime> {
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)?
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)?
    };
    Some(date.and_time(time))
}

/// Parse and resolve every scenario in a TOML document.
pub fn parse_scenarios(text: &str) -> Result<Vec<Scenario>, ConfigError> {
    let file: ScenarioFile = toml::from_str(text)?;
    let mut seen = HashSet::new();
    file.scenario
        .into_iter()
        .map(|entry| {
            if !seen.insert(entry.strategy_id.clone()) {
                return Err(ConfigError::DuplicateId(entry.strategy_id));
            }
            entry.resolve()
        })
        .collect()
}

/// Read and resolve a scenario file.
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_scenarios(&text)
}

/// Look up a scenario by its `strategy_id`.
pub fn find_scenario<'a>(scenarios: &'a [Scenario], id: &str) -> Result<&'a Scenario, ConfigError> {
    scenarios
        .iter()
        .find(|s| s.strategy_id == id)
        .ok_or_else(|| ConfigError::NotFound(id.to_string()))
}
