//! One scenario through classification, rolling reconfiguration and MESS
//! scheduling.

use crate::config::PipelineConfig;
use crate::context::SolveContext;
use crate::lp::OptimizationBackend;
use crate::mess::{DispatchSchedule, MessOutcome, MessScheduler};
use crate::phase::{PhaseClassifier, PhaseTimeline};
use crate::reconfig::{RollingPlan, RollingReconfigurator, StageStatus};
use dnr_core::{DnrResult, Network};
use dnr_scenarios::Scenario;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Name used for the scheduling stage in failure reports.
pub const MESS_STAGE: &str = "mess_schedule";

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub scenario_id: String,
    pub weight: f64,
    pub timeline: PhaseTimeline,
    pub plan: Option<RollingPlan>,
    pub schedule: Option<DispatchSchedule>,
    pub status: StageStatus,
    pub failed_stage: Option<String>,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl ScenarioOutcome {
    /// Timed-out scenarios keep only their summary and phase rows.
    pub fn persists_stage_rows(&self) -> bool {
        self.status != StageStatus::Timeout
    }

    pub fn unserved_mwh(&self) -> Option<f64> {
        self.schedule.as_ref().map(|s| s.unserved_mwh)
    }

    pub fn weighted_unserved_mwh(&self) -> Option<f64> {
        self.schedule.as_ref().map(|s| s.weighted_unserved_mwh)
    }

    fn mark_failed(&mut self, status: StageStatus, message: String) {
        self.status = self.status.max(status);
        if self.failed_stage.is_none() {
            self.failed_stage = Some(MESS_STAGE.to_string());
            self.error = Some(message);
        }
    }
}

/// Run every selected stage for `scenario`.
///
/// Infeasible and timed-out stages are recorded in the outcome; only errors
/// that invalidate the whole run (bad models, unreachable backend) are
/// returned as `Err`.
pub fn run_scenario(
    network: &Network,
    scenario: &Scenario,
    config: &PipelineConfig,
    backend: &dyn OptimizationBackend,
) -> DnrResult<ScenarioOutcome> {
    let started = Instant::now();
    let ctx = SolveContext::new(
        backend,
        config.solver.solve_time_limit(),
        config.solver.scenario_deadline(),
    );

    let timeline = PhaseClassifier::new(config.phase.clone()).classify(scenario);
    let mut outcome = ScenarioOutcome {
        scenario_id: scenario.id.clone(),
        weight: scenario.weight,
        timeline,
        plan: None,
        schedule: None,
        status: StageStatus::Ok,
        failed_stage: None,
        elapsed: Duration::ZERO,
        error: None,
    };

    if config.batch.stages.runs_reconfiguration() {
        let plan = RollingReconfigurator::new(network, &config.reconfig).plan(
            scenario,
            &outcome.timeline,
            &ctx,
        )?;
        outcome.status = plan.status();
        if let Some(stage) = plan.failed_stage() {
            outcome.failed_stage = Some(stage.to_string());
            outcome.error = plan
                .reports
                .iter()
                .find(|r| r.stage == stage)
                .and_then(|r| r.message.clone());
        }
        if config.batch.stages.runs_mess() && !plan.timed_out() {
            match MessScheduler::new(network, &config.mess).schedule(scenario, &plan, &ctx)? {
                MessOutcome::Scheduled(schedule) => outcome.schedule = Some(schedule),
                MessOutcome::Infeasible(reason) => {
                    warn!(scenario = %scenario.id, %reason, "mess schedule infeasible");
                    outcome.mark_failed(StageStatus::Infeasible, reason);
                }
                MessOutcome::TimedOut => {
                    warn!(scenario = %scenario.id, "mess schedule timed out");
                    outcome.mark_failed(StageStatus::Timeout, "mess schedule timed out".to_string());
                }
            }
        }
        outcome.plan = Some(plan);
    }

    outcome.elapsed = started.elapsed();
    info!(
        scenario = %outcome.scenario_id,
        status = %outcome.status,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "scenario finished"
    );
    Ok(outcome)
}
