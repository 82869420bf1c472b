use crate::lp::{Model, OptimizationBackend, SolveOutcome};
use dnr_core::DnrResult;
use std::time::{Duration, Instant};

/// Backend plus the time budget of one scenario.
///
/// Every solve receives `min(per-solve limit, remaining scenario budget)`.
pub struct SolveContext<'a> {
    backend: &'a dyn OptimizationBackend,
    per_solve: Duration,
    deadline: Instant,
}

impl<'a> SolveContext<'a> {
    pub fn new(backend: &'a dyn OptimizationBackend, per_solve: Duration, scenario_budget: Duration) -> Self {
        Self {
            backend,
            per_solve,
            deadline: Instant::now() + scenario_budget,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn next_limit(&self) -> Duration {
        self.per_solve
            .min(self.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn solve(&self, model: &Model) -> DnrResult<SolveOutcome> {
        self.backend.solve(model, self.next_limit())
    }
}
