//! Rolling topology reconfiguration: isolation → post-fault → post-repair.
//!
//! Each stage is a pure function of the previous stage's [`SwitchConfig`]
//! snapshot. Failed stages are recorded and skipped over: later stages start
//! from the last successful snapshot, or the normal configuration when there
//! is none. A timed-out stage ends the rolling plan.

use crate::config::ReconfigConfig;
use crate::context::SolveContext;
use crate::phase::{Phase, PhaseTimeline};
use dnr_core::graph_utils::{fault_zone, faulted_branches};
use dnr_core::{BranchId, BusId, Component, DnrResult, Network, SwitchConfig};
use dnr_scenarios::Scenario;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

pub mod isolation;
pub mod restoration;

pub use isolation::{IsolationOutcome, IsolationProblem, IsolationResult};
pub use restoration::{RestorationOutcome, RestorationProblem, RestorationResult, TopologyMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Isolation,
    PostFault,
    PostRepair,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Isolation => "isolation",
            Stage::PostFault => "post_fault",
            Stage::PostRepair => "post_repair",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class of a stage or scenario, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Ok,
    Infeasible,
    Timeout,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Ok => "OK",
            StageStatus::Infeasible => "INFEASIBLE",
            StageStatus::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub phase: Phase,
    /// Step whose outage set the stage was solved for
    pub time_step: usize,
    /// First step the snapshot governs
    pub active_from: usize,
    pub status: StageStatus,
    /// Resulting snapshot; `None` unless the stage succeeded
    pub config: Option<SwitchConfig>,
    pub flows: BTreeMap<BranchId, f64>,
    pub served_mw: f64,
    pub switch_operations: usize,
    pub isolated_buses: BTreeSet<BusId>,
    pub message: Option<String>,
}

impl StageReport {
    fn failed(
        stage: Stage,
        phase: Phase,
        time_step: usize,
        active_from: usize,
        status: StageStatus,
        message: String,
    ) -> Self {
        Self {
            stage,
            phase,
            time_step,
            active_from,
            status,
            config: None,
            flows: BTreeMap::new(),
            served_mw: 0.0,
            switch_operations: 0,
            isolated_buses: BTreeSet::new(),
            message: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StageStatus::Ok
    }
}

/// Stage reports of one scenario, in solve order.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingPlan {
    pub normal: SwitchConfig,
    pub reports: Vec<StageReport>,
}

impl RollingPlan {
    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }

    /// Worst stage status; `Ok` for a plan with no stages.
    pub fn status(&self) -> StageStatus {
        self.reports
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(StageStatus::Ok)
    }

    /// First stage that did not succeed.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.reports.iter().find(|r| !r.is_ok()).map(|r| r.stage)
    }

    pub fn timed_out(&self) -> bool {
        self.reports.iter().any(|r| r.status == StageStatus::Timeout)
    }

    /// Snapshot in force at step `t`.
    ///
    /// The latest successful stage active at `t` wins; failed stages fall back
    /// to the previous snapshot and ultimately to the normal configuration.
    pub fn config_for_step(&self, t: usize) -> &SwitchConfig {
        self.reports
            .iter()
            .filter(|r| r.active_from <= t)
            .filter_map(|r| r.config.as_ref())
            .last()
            .unwrap_or(&self.normal)
    }

    fn last_config(&self) -> &SwitchConfig {
        self.reports
            .iter()
            .filter_map(|r| r.config.as_ref())
            .last()
            .unwrap_or(&self.normal)
    }
}

pub struct RollingReconfigurator<'a> {
    network: &'a Network,
    config: &'a ReconfigConfig,
}

impl<'a> RollingReconfigurator<'a> {
    pub fn new(network: &'a Network, config: &'a ReconfigConfig) -> Self {
        Self { network, config }
    }

    pub fn plan(
        &self,
        scenario: &Scenario,
        timeline: &PhaseTimeline,
        ctx: &SolveContext<'_>,
    ) -> DnrResult<RollingPlan> {
        let mut plan = RollingPlan {
            normal: SwitchConfig::normal(self.network),
            reports: Vec::new(),
        };
        let Some(iso_step) = timeline.first_step_of(Phase::FaultPropagation) else {
            debug!(scenario = %scenario.id, "no fault; rolling plan is the normal configuration");
            return Ok(plan);
        };
        let er_step = timeline.first_step_of(Phase::EarlyRecovery);
        let pr_step = timeline.first_step_of(Phase::PostRecovery);

        let last_step = scenario.horizon().saturating_sub(1);
        let window_end = er_step.map_or(last_step, |er| er - 1);
        let propagation = scenario.outage_union(iso_step..=window_end);

        let isolation = self.isolate(
            Stage::Isolation,
            Phase::FaultPropagation,
            iso_step,
            iso_step,
            &plan.normal,
            &propagation,
            ctx,
        )?;
        plan.reports.push(isolation);
        if plan.timed_out() {
            return Ok(plan);
        }

        // Every snapshot is solved for all outages of the steps it governs.
        let (pf_step, pf_phase, pf_from, pf_outages) = match er_step {
            Some(er) => {
                let er_end = pr_step.map_or(last_step, |pr| pr - 1);
                (
                    er,
                    Phase::EarlyRecovery,
                    er,
                    scenario.outage_union(er..=er_end),
                )
            }
            None => (iso_step, Phase::FaultPropagation, iso_step + 1, propagation.clone()),
        };
        let previous = plan.last_config().clone();
        let dead = fault_zone(self.network, &pf_outages);
        let post_fault = self.restore(
            Stage::PostFault,
            pf_phase,
            pf_step,
            pf_from,
            &pf_outages,
            &dead,
            TopologyMode::Reconfigure {
                previous: &previous,
                switching_cost: self.config.switching_cost,
                revert: None,
                max_tie_operations: self.config.max_tie_operations,
            },
            &previous,
            ctx,
        )?;
        plan.reports.push(post_fault);
        if plan.timed_out() {
            return Ok(plan);
        }

        let Some(pr_step) = pr_step else {
            return Ok(plan);
        };
        let residual = scenario.outage_union(pr_step..=last_step);
        let post_fault_snapshot = plan.last_config().clone();

        let reisolated = self.isolate(
            Stage::PostRepair,
            Phase::PostRecovery,
            pr_step,
            pr_step,
            &post_fault_snapshot,
            &residual,
            ctx,
        )?;
        if !reisolated.is_ok() {
            plan.reports.push(reisolated);
            return Ok(plan);
        }
        debug!(
            scenario = %scenario.id,
            residual = residual.len(),
            zone = reisolated.isolated_buses.len(),
            "residual faults re-isolated"
        );
        let normal = plan.normal.clone();
        let post_repair = self.restore(
            Stage::PostRepair,
            Phase::PostRecovery,
            pr_step,
            pr_step,
            &residual,
            &reisolated.isolated_buses,
            TopologyMode::Reconfigure {
                previous: &post_fault_snapshot,
                switching_cost: self.config.switching_cost,
                revert: Some((&normal, self.config.revert_cost)),
                max_tie_operations: self.config.max_tie_operations,
            },
            &post_fault_snapshot,
            ctx,
        )?;
        plan.reports.push(post_repair);
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn isolate(
        &self,
        stage: Stage,
        phase: Phase,
        step: usize,
        active_from: usize,
        previous: &SwitchConfig,
        outages: &BTreeSet<Component>,
        ctx: &SolveContext<'_>,
    ) -> DnrResult<StageReport> {
        let problem = IsolationProblem {
            network: self.network,
            previous,
            outages,
            switching_cost: self.config.isolation_switching_cost,
        };
        let result = match problem.solve(ctx)? {
            IsolationOutcome::Isolated(result) => result,
            IsolationOutcome::Infeasible(reason) => {
                warn!(%stage, step, %reason, "fault isolation infeasible");
                return Ok(StageReport::failed(
                    stage,
                    phase,
                    step,
                    active_from,
                    StageStatus::Infeasible,
                    format!("fault isolation infeasible: {reason}"),
                ));
            }
            IsolationOutcome::TimedOut => {
                return Ok(StageReport::failed(
                    stage,
                    phase,
                    step,
                    active_from,
                    StageStatus::Timeout,
                    "fault isolation timed out".to_string(),
                ));
            }
        };

        let faulted = faulted_branches(outages);
        let mut report = self.restore(
            stage,
            phase,
            step,
            active_from,
            outages,
            &result.zone,
            TopologyMode::Fixed(&result.config),
            previous,
            ctx,
        )?;
        report.isolated_buses = result.zone.clone();
        if report.is_ok() {
            info!(
                %stage,
                step,
                faulted = faulted.len(),
                opened = result.opened.len(),
                zone = result.zone.len(),
                served_mw = report.served_mw,
                "faults isolated"
            );
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn restore(
        &self,
        stage: Stage,
        phase: Phase,
        step: usize,
        active_from: usize,
        outages: &BTreeSet<Component>,
        dead: &BTreeSet<BusId>,
        mode: TopologyMode<'_>,
        reference: &SwitchConfig,
        ctx: &SolveContext<'_>,
    ) -> DnrResult<StageReport> {
        let faulted = faulted_branches(outages);
        let problem = RestorationProblem {
            name: format!("{stage}_t{step}"),
            network: self.network,
            dead,
            faulted: &faulted,
            mode,
        };
        match problem.solve(ctx)? {
            RestorationOutcome::Solved(result) => {
                let switch_operations = result.config.operations_from(reference);
                if !matches!(mode, TopologyMode::Fixed(_)) {
                    info!(
                        %stage,
                        step,
                        served_mw = result.dispatch.served_mw,
                        switch_operations,
                        "restoration solved"
                    );
                }
                Ok(StageReport {
                    stage,
                    phase,
                    time_step: step,
                    active_from,
                    status: StageStatus::Ok,
                    config: Some(result.config),
                    flows: result.dispatch.flows,
                    served_mw: result.dispatch.served_mw,
                    switch_operations,
                    isolated_buses: dead.clone(),
                    message: None,
                })
            }
            RestorationOutcome::Infeasible(reason) => {
                warn!(%stage, step, %reason, "restoration infeasible");
                Ok(StageReport::failed(
                    stage,
                    phase,
                    step,
                    active_from,
                    StageStatus::Infeasible,
                    reason,
                ))
            }
            RestorationOutcome::TimedOut => Ok(StageReport::failed(
                stage,
                phase,
                step,
                active_from,
                StageStatus::Timeout,
                format!("{stage} restoration timed out"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhaseConfig;
    use crate::lp::GoodLpBackend;
    use crate::phase::PhaseClassifier;
    use crate::test_utils::{five_bus_radial, five_bus_scenario, radial_without_backup};
    use dnr_core::graph_utils::{energized_buses, radiality};
    use std::time::Duration;

    fn plan_for(network: &Network, scenario: &Scenario, budget: Duration) -> RollingPlan {
        let backend = GoodLpBackend::default();
        let ctx = SolveContext::new(&backend, Duration::from_secs(30), budget);
        let timeline = PhaseClassifier::new(PhaseConfig::default()).classify(scenario);
        let config = ReconfigConfig::default();
        RollingReconfigurator::new(network, &config)
            .plan(scenario, &timeline, &ctx)
            .unwrap()
    }

    #[test]
    fn no_fault_keeps_normal_configuration() {
        let network = five_bus_radial();
        let scenario = Scenario::new("calm", 1.0, 5);
        let plan = plan_for(&network, &scenario, Duration::from_secs(60));
        assert!(plan.reports.is_empty());
        assert_eq!(plan.status(), StageStatus::Ok);
        assert_eq!(plan.config_for_step(3), &plan.normal);
    }

    #[test]
    fn repaired_fault_runs_all_three_stages() {
        let network = five_bus_radial();
        let scenario = five_bus_scenario();
        let plan = plan_for(&network, &scenario, Duration::from_secs(120));
        let stages: Vec<Stage> = plan.reports.iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![Stage::Isolation, Stage::PostFault, Stage::PostRepair]);
        assert_eq!(plan.status(), StageStatus::Ok);

        let isolation = plan.report(Stage::Isolation).unwrap();
        assert_eq!(isolation.time_step, 3);
        assert!(!isolation.config.as_ref().unwrap().is_closed(BranchId::new(2)));

        let post_fault = plan.report(Stage::PostFault).unwrap();
        assert_eq!(post_fault.time_step, 5);
        assert_eq!(post_fault.phase, Phase::EarlyRecovery);

        let post_repair = plan.report(Stage::PostRepair).unwrap();
        assert_eq!(post_repair.time_step, 6);
        assert_eq!(post_repair.config.as_ref(), Some(&plan.normal));

        assert!(!plan.config_for_step(3).is_closed(BranchId::new(2)));
        assert_eq!(plan.config_for_step(6), &plan.normal);
        assert_eq!(plan.config_for_step(1), &plan.normal);
    }

    fn assert_faults_stay_open(plan: &RollingPlan, scenario: &Scenario) {
        for t in 0..scenario.horizon() {
            let outages = scenario.outages_at(t).unwrap();
            for branch in faulted_branches(outages) {
                assert!(
                    !plan.config_for_step(t).is_closed(branch),
                    "{}: faulted {branch} closed at step {t}",
                    scenario.id
                );
            }
        }
    }

    #[test]
    fn staggered_repairs_leave_propagation_to_isolation() {
        let network = five_bus_radial();
        let scenario = Scenario::new("staggered", 1.0, 8)
            .with_outage(Component::Branch(BranchId::new(2)), 1..=3)
            .with_outage(Component::Branch(BranchId::new(4)), 1..=4);
        let plan = plan_for(&network, &scenario, Duration::from_secs(120));
        assert_eq!(plan.status(), StageStatus::Ok);

        let post_fault = plan.report(Stage::PostFault).unwrap();
        assert_eq!(post_fault.time_step, 4);
        assert_eq!(post_fault.active_from, 4);
        let isolation = plan.report(Stage::Isolation).unwrap().config.as_ref().unwrap();
        for t in 1..=3 {
            assert_eq!(plan.config_for_step(t), isolation);
        }
        assert!(!plan.config_for_step(4).is_closed(BranchId::new(4)));
        assert_faults_stay_open(&plan, &scenario);
    }

    #[test]
    fn faulted_branches_stay_open_at_every_step() {
        let network = five_bus_radial();
        let branch = |id| Component::Branch(BranchId::new(id));
        let scenarios = [
            Scenario::new("two_repairs", 1.0, 8)
                .with_outage(branch(2), 1..=3)
                .with_outage(branch(4), 1..=4),
            Scenario::new("upstream_first", 1.0, 8)
                .with_outage(branch(1), 2..=2)
                .with_outage(branch(3), 2..=5),
            Scenario::new("late_fault", 1.0, 8)
                .with_outage(branch(2), 1..=2)
                .with_outage(branch(3), 4..=5),
            Scenario::new("never_repaired", 1.0, 6)
                .with_outage(branch(3), 1..=5)
                .with_outage(branch(2), 2..=5),
        ];
        for scenario in &scenarios {
            let plan = plan_for(&network, scenario, Duration::from_secs(120));
            assert_eq!(plan.status(), StageStatus::Ok, "{}", scenario.id);
            assert_faults_stay_open(&plan, scenario);
        }
    }

    #[test]
    fn outputs_are_radial_and_sourced() {
        let network = five_bus_radial();
        let scenario = five_bus_scenario();
        let plan = plan_for(&network, &scenario, Duration::from_secs(120));
        for report in &plan.reports {
            let config = report.config.as_ref().unwrap();
            let energized = energized_buses(&network, config, &report.isolated_buses);
            let check = radiality(&network, config, &energized);
            assert!(check.is_radial(), "{} not radial: {check:?}", report.stage);
        }
    }

    #[test]
    fn stranded_load_makes_post_fault_infeasible() {
        let network = radial_without_backup();
        let scenario = Scenario::new("stranded", 1.0, 6)
            .with_outage(Component::Branch(BranchId::new(2)), 2..=5);
        let plan = plan_for(&network, &scenario, Duration::from_secs(120));

        let isolation = plan.report(Stage::Isolation).unwrap();
        assert_eq!(isolation.status, StageStatus::Ok);
        let post_fault = plan.report(Stage::PostFault).unwrap();
        assert_eq!(post_fault.status, StageStatus::Infeasible);
        assert!(post_fault.config.is_none());
        assert!(post_fault.message.as_deref().unwrap().contains("Bus 3"));
        assert!(plan.report(Stage::PostRepair).is_none());

        assert_eq!(plan.status(), StageStatus::Infeasible);
        assert_eq!(plan.failed_stage(), Some(Stage::PostFault));
        // The isolation snapshot stays in force after the failed stage.
        assert_eq!(plan.config_for_step(4), isolation.config.as_ref().unwrap());
    }

    #[test]
    fn exhausted_budget_times_out_and_stops() {
        let network = five_bus_radial();
        let scenario = five_bus_scenario();
        let plan = plan_for(&network, &scenario, Duration::ZERO);
        assert_eq!(plan.reports.len(), 1);
        assert_eq!(plan.status(), StageStatus::Timeout);
        assert!(plan.timed_out());
    }

    #[test]
    fn identical_inputs_give_identical_plans() {
        let network = five_bus_radial();
        let scenario = five_bus_scenario();
        let a = plan_for(&network, &scenario, Duration::from_secs(120));
        let b = plan_for(&network, &scenario, Duration::from_secs(120));
        let statuses = |p: &RollingPlan| p.reports.iter().map(|r| (r.stage, r.status)).collect::<Vec<_>>();
        assert_eq!(statuses(&a), statuses(&b));
        for (ra, rb) in a.reports.iter().zip(&b.reports) {
            assert_eq!(ra.config, rb.config);
        }
    }
}
