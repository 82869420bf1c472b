//! # dnr-algo: resilience optimization for AC/DC hybrid distribution networks
//!
//! This crate turns Monte Carlo failure trajectories into recovery plans. Each
//! scenario passes three stages:
//!
//! | Stage | Module | Problem class |
//! |-------|--------|---------------|
//! | Phase classification | [`phase`] | State machine |
//! | Rolling reconfiguration (isolation, post-fault, post-repair) | [`reconfig`] | MILP |
//! | MESS coordinated scheduling | [`mess`] | Time-indexed MILP |
//!
//! ### Architecture
//!
//! Models are written against the solver-agnostic [`lp::ModelBuilder`] and
//! solved through an [`lp::OptimizationBackend`]; [`lp::GoodLpBackend`] is the
//! shipped implementation (microlp by default, HiGHS behind `solver-highs`).
//! A [`context::SolveContext`] caps every solve by the remaining scenario
//! budget. [`pipeline::run_scenario`] chains the stages for one scenario and
//! [`io::ArtifactWriter`] persists the resulting tables.
//!
//! ## Example
//!
//! ```ignore
//! use dnr_algo::{run_scenario, GoodLpBackend, PipelineConfig};
//!
//! let outcome = run_scenario(&network, &scenario, &PipelineConfig::default(), &GoodLpBackend::default())?;
//! println!("{}: {} ({:?} MWh unserved)", outcome.scenario_id, outcome.status, outcome.unserved_mwh());
//! ```

pub mod config;
pub mod context;
pub(crate) mod dispatch;
pub mod io;
pub mod lp;
pub mod mess;
pub mod phase;
pub mod pipeline;
pub mod reconfig;
pub mod test_utils;

pub use config::{
    BatchConfig, MessConfig, OutputFormat, PhaseConfig, PipelineConfig, ReconfigConfig,
    SolverConfig, StageSelection,
};
pub use context::SolveContext;
pub use dispatch::DispatchReadout;
pub use io::{artifact_path, ArtifactTable, ArtifactWriter};
pub use lp::{BackendKind, GoodLpBackend, OptimizationBackend, SolveOutcome};
pub use mess::{DispatchEntry, DispatchSchedule, MessScheduler, UnitLocation};
pub use phase::{Phase, PhaseClassifier, PhaseTimeline};
pub use pipeline::{run_scenario, ScenarioOutcome};
pub use reconfig::{RollingPlan, RollingReconfigurator, Stage, StageReport, StageStatus};
