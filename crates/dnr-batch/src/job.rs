use dnr_algo::{ScenarioOutcome, StageStatus};
use serde::{Deserialize, Serialize};

/// Per-scenario line of the batch manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioRecord {
    pub scenario_id: String,
    pub weight: f64,
    pub status: StageStatus,
    pub failed_stage: Option<String>,
    pub unserved_mwh: Option<f64>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl ScenarioRecord {
    pub fn from_outcome(outcome: &ScenarioOutcome) -> Self {
        Self {
            scenario_id: outcome.scenario_id.clone(),
            weight: outcome.weight,
            status: outcome.status,
            failed_stage: outcome.failed_stage.clone(),
            unserved_mwh: outcome.unserved_mwh(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            error: outcome.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub ok: usize,
    pub infeasible: usize,
    pub timeout: usize,
}

impl StatusCounts {
    pub fn tally(records: &[ScenarioRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.status {
                StageStatus::Ok => counts.ok += 1,
                StageStatus::Infeasible => counts.infeasible += 1,
                StageStatus::Timeout => counts.timeout += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.ok + self.infeasible + self.timeout
    }
}

/// Probability-weighted resilience figures over a batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResilienceMetrics {
    pub total_weight: f64,
    pub ok_weight: f64,
    /// Weight of scenarios with an infeasible stage
    pub unrecoverable_weight: f64,
    pub timed_out_weight: f64,
    /// Sum of weight times unserved energy over OK scenarios
    pub weighted_unserved_mwh: Option<f64>,
    /// `weighted_unserved_mwh` divided by the OK weight
    pub expected_unserved_mwh: Option<f64>,
}

impl ResilienceMetrics {
    /// Unserved-energy figures stay `None` when no OK scenario was scheduled.
    pub fn aggregate(records: &[ScenarioRecord]) -> Self {
        let mut metrics = Self::default();
        let mut weighted = None::<f64>;
        for record in records {
            metrics.total_weight += record.weight;
            match record.status {
                StageStatus::Ok => {
                    metrics.ok_weight += record.weight;
                    if let Some(unserved) = record.unserved_mwh {
                        *weighted.get_or_insert(0.0) += record.weight * unserved;
                    }
                }
                StageStatus::Infeasible => metrics.unrecoverable_weight += record.weight,
                StageStatus::Timeout => metrics.timed_out_weight += record.weight,
            }
        }
        metrics.weighted_unserved_mwh = weighted;
        metrics.expected_unserved_mwh = weighted
            .filter(|_| metrics.ok_weight > 0.0)
            .map(|w| w / metrics.ok_weight);
        metrics
    }
}
