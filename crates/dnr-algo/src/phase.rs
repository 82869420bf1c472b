//! Temporal phase classification of failure trajectories.
//!
//! Each time step of a scenario is labelled with one of four ordered phases:
//!
//! | Phase | Entered when |
//! |-------|--------------|
//! | `BASELINE` | no outage seen yet |
//! | `FAULT_PROPAGATION` | first step with an outage |
//! | `EARLY_RECOVERY` | first strict decrease of the outage count |
//! | `POST_RECOVERY` | the step after the count reaches the residual threshold, or the recovery budget runs out |
//!
//! Labels never move backwards: a new failure during recovery leaves the
//! current phase in place. The step on which full restoration is observed is
//! still `EARLY_RECOVERY`.

use crate::config::PhaseConfig;
use dnr_scenarios::Scenario;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Baseline,
    FaultPropagation,
    EarlyRecovery,
    PostRecovery,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Baseline => "BASELINE",
            Phase::FaultPropagation => "FAULT_PROPAGATION",
            Phase::EarlyRecovery => "EARLY_RECOVERY",
            Phase::PostRecovery => "POST_RECOVERY",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the outage count against the previous step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStep {
    pub time_step: usize,
    pub phase: Phase,
    pub outage_count: usize,
    pub trend: Trend,
    /// Steps since the first fault; `None` before it
    pub elapsed_since_fault: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimeline {
    pub scenario_id: String,
    pub steps: Vec<PhaseStep>,
}

impl PhaseTimeline {
    pub fn phase_at(&self, step: usize) -> Option<Phase> {
        self.steps.get(step).map(|s| s.phase)
    }

    pub fn labels(&self) -> Vec<Phase> {
        self.steps.iter().map(|s| s.phase).collect()
    }

    /// First and last step carrying `phase`, if any.
    pub fn window(&self, phase: Phase) -> Option<RangeInclusive<usize>> {
        let first = self.steps.iter().position(|s| s.phase == phase)?;
        let last = self.steps.iter().rposition(|s| s.phase == phase)?;
        Some(first..=last)
    }

    pub fn first_step_of(&self, phase: Phase) -> Option<usize> {
        self.window(phase).map(|w| *w.start())
    }

    pub fn is_baseline_only(&self) -> bool {
        self.steps.iter().all(|s| s.phase == Phase::Baseline)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhaseClassifier {
    config: PhaseConfig,
}

impl PhaseClassifier {
    pub fn new(config: PhaseConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, scenario: &Scenario) -> PhaseTimeline {
        let counts = scenario.outage_counts();
        PhaseTimeline {
            scenario_id: scenario.id.clone(),
            steps: self.classify_counts(&counts),
        }
    }

    /// Run the phase state machine over a sequence of outage counts.
    pub fn classify_counts(&self, counts: &[usize]) -> Vec<PhaseStep> {
        let mut steps = Vec::with_capacity(counts.len());
        let mut phase = Phase::Baseline;
        let mut previous = 0usize;
        let mut peak = 0usize;
        let mut fault_start: Option<usize> = None;
        let mut recovery_start: Option<usize> = None;

        for (t, &count) in counts.iter().enumerate() {
            let trend = match count.cmp(&previous) {
                std::cmp::Ordering::Greater => Trend::Increasing,
                std::cmp::Ordering::Equal => Trend::Stable,
                std::cmp::Ordering::Less => Trend::Decreasing,
            };

            phase = match phase {
                Phase::Baseline if count > 0 => {
                    fault_start = Some(t);
                    Phase::FaultPropagation
                }
                Phase::FaultPropagation if count < previous => {
                    recovery_start = Some(t);
                    Phase::EarlyRecovery
                }
                Phase::EarlyRecovery if self.recovery_over(t, previous, peak, recovery_start) => {
                    Phase::PostRecovery
                }
                unchanged => unchanged,
            };

            peak = peak.max(count);
            steps.push(PhaseStep {
                time_step: t,
                phase,
                outage_count: count,
                trend,
                elapsed_since_fault: fault_start.map(|start| t - start),
            });
            previous = count;
        }
        steps
    }

    /// Whether step `t` already lies beyond the early-recovery window.
    fn recovery_over(&self, t: usize, previous: usize, peak: usize, start: Option<usize>) -> bool {
        let threshold = self.config.post_recovery_residual_fraction * peak as f64;
        if previous as f64 <= threshold {
            return true;
        }
        match (self.config.early_recovery_budget_steps, start) {
            (Some(budget), Some(start)) => t - start >= budget as usize,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Phase::*;

    fn labels(config: PhaseConfig, counts: &[usize]) -> Vec<Phase> {
        PhaseClassifier::new(config)
            .classify_counts(counts)
            .into_iter()
            .map(|s| s.phase)
            .collect()
    }

    #[test]
    fn zero_outages_stay_baseline() {
        assert_eq!(labels(PhaseConfig::default(), &[0, 0, 0, 0]), vec![Baseline; 4]);
    }

    #[test]
    fn single_branch_fault_repaired() {
        let counts = [0, 0, 0, 1, 1, 0, 0, 0];
        assert_eq!(
            labels(PhaseConfig::default(), &counts),
            vec![
                Baseline,
                Baseline,
                Baseline,
                FaultPropagation,
                FaultPropagation,
                EarlyRecovery,
                PostRecovery,
                PostRecovery
            ]
        );
    }

    #[test]
    fn never_recovering_without_budget() {
        let counts = [0, 2, 3, 2, 2, 1, 1];
        let phases = labels(PhaseConfig::default(), &counts);
        assert_eq!(phases[1], FaultPropagation);
        assert_eq!(phases[3], EarlyRecovery);
        assert_eq!(*phases.last().unwrap(), EarlyRecovery);
    }

    #[test]
    fn budget_ends_early_recovery() {
        let config = PhaseConfig {
            early_recovery_budget_steps: Some(2),
            ..PhaseConfig::default()
        };
        let counts = [0, 2, 1, 1, 1, 1];
        assert_eq!(
            labels(config, &counts),
            vec![Baseline, FaultPropagation, EarlyRecovery, EarlyRecovery, PostRecovery, PostRecovery]
        );
    }

    #[test]
    fn residual_fraction_ends_early_recovery() {
        let config = PhaseConfig {
            post_recovery_residual_fraction: 0.25,
            ..PhaseConfig::default()
        };
        let counts = [4, 3, 1, 1, 1];
        assert_eq!(
            labels(config, &counts),
            vec![FaultPropagation, EarlyRecovery, EarlyRecovery, PostRecovery, PostRecovery]
        );
    }

    #[test]
    fn new_fault_during_recovery_does_not_regress() {
        let counts = [0, 1, 2, 1, 3, 0, 0];
        let phases = labels(PhaseConfig::default(), &counts);
        assert!(phases.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(phases[4], EarlyRecovery);
        assert_eq!(phases[6], PostRecovery);
    }

    #[test]
    fn trend_and_elapsed_are_tracked() {
        let steps = PhaseClassifier::default().classify_counts(&[0, 1, 1, 0]);
        assert_eq!(steps[0].elapsed_since_fault, None);
        assert_eq!(steps[1].trend, Trend::Increasing);
        assert_eq!(steps[2].trend, Trend::Stable);
        assert_eq!(steps[3].trend, Trend::Decreasing);
        assert_eq!(steps[3].elapsed_since_fault, Some(2));
    }

    #[test]
    fn classification_is_idempotent() {
        let counts = [0, 1, 3, 2, 0, 0];
        let classifier = PhaseClassifier::default();
        assert_eq!(classifier.classify_counts(&counts), classifier.classify_counts(&counts));
    }

    #[test]
    fn windows_are_reported() {
        let scenario = dnr_scenarios::Scenario::new("w", 1.0, 6).with_outage(
            dnr_core::Component::Branch(dnr_core::BranchId::new(1)),
            1..=2,
        );
        let timeline = PhaseClassifier::default().classify(&scenario);
        assert_eq!(timeline.window(FaultPropagation), Some(1..=2));
        assert_eq!(timeline.first_step_of(EarlyRecovery), Some(3));
        assert_eq!(timeline.window(PostRecovery), Some(4..=5));
    }
}
