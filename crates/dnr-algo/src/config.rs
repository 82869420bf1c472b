//! Pipeline configuration.
//!
//! [`PipelineConfig`] is loaded from TOML and supports partial files: every
//! section and field falls back to its default.
//!
//! ```toml
//! [phase]
//! early_recovery_budget_steps = 4
//!
//! [reconfig]
//! switching_cost = 0.001
//! max_tie_operations = 2
//!
//! [mess]
//! step_hours = 0.5
//! exclusive_stations = true
//!
//! [solver]
//! backend = "microlp"
//! solve_time_limit_ms = 20000
//!
//! [batch]
//! threads = 0
//! stages = "full"
//! ```

use dnr_core::{DnrError, DnrResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub phase: PhaseConfig,
    pub reconfig: ReconfigConfig,
    pub mess: MessConfig,
    pub solver: SolverConfig,
    pub batch: BatchConfig,
}

/// Thresholds of the phase state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhaseConfig {
    /// Longest EARLY_RECOVERY window, counted from its first step; unlimited when unset.
    pub early_recovery_budget_steps: Option<u32>,
    /// POST_RECOVERY begins after the outage count falls to this share of the peak.
    pub post_recovery_residual_fraction: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            early_recovery_budget_steps: None,
            post_recovery_residual_fraction: 0.0,
        }
    }
}

/// Cost weights of the reconfiguration MILPs.
///
/// Weights are in MW-equivalents of served load, so they must stay well below
/// the smallest load that matters for the served-load term to dominate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconfigConfig {
    /// Penalty per opening in the isolation stage
    pub isolation_switching_cost: f64,
    /// Penalty per operation against the previous stage's configuration
    pub switching_cost: f64,
    /// Penalty per branch left in a non-normal state after repair
    pub revert_cost: f64,
    /// Upper bound on tie-switch operations per restoration stage
    pub max_tie_operations: Option<u32>,
}

impl Default for ReconfigConfig {
    fn default() -> Self {
        Self {
            isolation_switching_cost: 1e-3,
            switching_cost: 1e-3,
            revert_cost: 1e-2,
            max_tie_operations: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessConfig {
    /// Duration of one scenario time step
    pub step_hours: f64,
    /// Penalty per MWh charged or discharged
    pub cycling_penalty: f64,
    /// Allow at most one unit per station and step
    pub exclusive_stations: bool,
}

impl Default for MessConfig {
    fn default() -> Self {
        Self {
            step_hours: 1.0,
            cycling_penalty: 1e-4,
            exclusive_stations: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: String,
    /// Limit for a single MILP solve
    pub solve_time_limit_ms: u64,
    /// Overall budget for one scenario; every solve gets at most what remains
    pub scenario_deadline_ms: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: "microlp".to_string(),
            solve_time_limit_ms: 30_000,
            scenario_deadline_ms: 120_000,
        }
    }
}

impl SolverConfig {
    pub fn solve_time_limit(&self) -> Duration {
        Duration::from_millis(self.solve_time_limit_ms)
    }

    pub fn scenario_deadline(&self) -> Duration {
        Duration::from_millis(self.scenario_deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; 0 uses every CPU
    pub threads: usize,
    pub stages: StageSelection,
    pub output_format: OutputFormat,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            stages: StageSelection::Full,
            output_format: OutputFormat::Parquet,
        }
    }
}

/// How far the pipeline runs for each scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageSelection {
    Classify,
    Reconfigure,
    #[default]
    Full,
}

impl StageSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageSelection::Classify => "classify",
            StageSelection::Reconfigure => "reconfigure",
            StageSelection::Full => "full",
        }
    }

    pub fn runs_reconfiguration(&self) -> bool {
        !matches!(self, StageSelection::Classify)
    }

    pub fn runs_mess(&self) -> bool {
        matches!(self, StageSelection::Full)
    }
}

impl FromStr for StageSelection {
    type Err = DnrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "classify" | "phase" => Ok(StageSelection::Classify),
            "reconfigure" | "reconfig" => Ok(StageSelection::Reconfigure),
            "full" | "all" => Ok(StageSelection::Full),
            other => Err(DnrError::Config(format!(
                "unknown stage selection '{other}'; expected classify, reconfigure or full"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = DnrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "parquet" => Ok(OutputFormat::Parquet),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(DnrError::Config(format!(
                "unknown output format '{other}'; expected parquet or csv"
            ))),
        }
    }
}

impl PipelineConfig {
    pub fn load_from(path: &Path) -> DnrResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| DnrError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DnrResult<()> {
        if self.phase.early_recovery_budget_steps == Some(0) {
            return Err(DnrError::Config(
                "phase.early_recovery_budget_steps must be at least 1".into(),
            ));
        }
        let fraction = self.phase.post_recovery_residual_fraction;
        if !(0.0..1.0).contains(&fraction) {
            return Err(DnrError::Config(format!(
                "phase.post_recovery_residual_fraction must lie in [0, 1), got {fraction}"
            )));
        }
        let r = &self.reconfig;
        if r.isolation_switching_cost < 0.0 || r.switching_cost < 0.0 {
            return Err(DnrError::Config("switching costs must be non-negative".into()));
        }
        if r.revert_cost <= r.switching_cost {
            return Err(DnrError::Config(format!(
                "reconfig.revert_cost ({}) must exceed reconfig.switching_cost ({})",
                r.revert_cost, r.switching_cost
            )));
        }
        if !(self.mess.step_hours > 0.0) {
            return Err(DnrError::Config("mess.step_hours must be positive".into()));
        }
        if self.mess.cycling_penalty < 0.0 {
            return Err(DnrError::Config("mess.cycling_penalty must be non-negative".into()));
        }
        if self.solver.solve_time_limit_ms == 0 || self.solver.scenario_deadline_ms == 0 {
            return Err(DnrError::Config("solver time limits must be positive".into()));
        }
        Ok(())
    }
}
