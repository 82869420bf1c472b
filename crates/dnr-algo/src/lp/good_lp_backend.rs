use super::{LinExpr, Model, ObjectiveSense, OptimizationBackend, Relation, SolveOutcome, Solution, VarKind};
use dnr_core::{DnrError, DnrResult};
use good_lp::solvers::microlp::microlp;
#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution as _, SolutionStatus,
    SolverModel, Variable,
};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Mixed-integer solvers reachable through good_lp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// Pure-Rust branch and bound, always available
    #[default]
    Microlp,
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl BackendKind {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_BACKENDS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Microlp => "microlp",
            #[cfg(feature = "solver-highs")]
            BackendKind::Highs => "highs",
        }
    }

    pub fn create(&self) -> Arc<dyn OptimizationBackend> {
        Arc::new(GoodLpBackend::new(*self))
    }
}

const AVAILABLE_BACKENDS: &[&str] = &[
    "microlp",
    #[cfg(feature = "solver-highs")]
    "highs",
];

fn unknown_backend_error(label: &str) -> DnrError {
    DnrError::BackendUnavailable(format!(
        "unknown solver backend '{}'; supported values: {}",
        label,
        BackendKind::available().join(", ")
    ))
}

impl FromStr for BackendKind {
    type Err = DnrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "microlp" | "default" => Ok(BackendKind::Microlp),
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(BackendKind::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            other => Err(unknown_backend_error(other)),
        }
    }
}

/// [`OptimizationBackend`] on top of good_lp.
///
/// Each solve runs on its own worker thread; the caller waits at most the
/// time limit and reports [`SolveOutcome::TimedOut`] afterwards. HiGHS also
/// receives the limit and stops on its own; a timed-out microlp worker is
/// detached and finishes in the background.
///
/// Only a proven infeasibility becomes [`SolveOutcome::Infeasible`]. A worker
/// that dies or a solver error other than infeasibility is
/// [`DnrError::BackendUnavailable`].
#[derive(Debug, Clone, Copy)]
pub struct GoodLpBackend {
    kind: BackendKind,
}

impl GoodLpBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }
}

impl Default for GoodLpBackend {
    fn default() -> Self {
        Self::new(BackendKind::default())
    }
}

impl OptimizationBackend for GoodLpBackend {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn solve(&self, model: &Model, time_limit: Duration) -> DnrResult<SolveOutcome> {
        if time_limit.is_zero() {
            return Ok(SolveOutcome::TimedOut);
        }
        let started = Instant::now();
        let (tx, rx) = mpsc::channel();
        let owned = model.clone();
        let kind = self.kind;
        thread::Builder::new()
            .name(format!("dnr-solve-{}", model.name))
            .spawn(move || {
                // The receiver is gone once the caller has timed out.
                let _ = tx.send(solve_blocking(&owned, kind, time_limit));
            })
            .map_err(|e| DnrError::BackendUnavailable(format!("spawning solver thread: {e}")))?;

        let outcome = wait_for(&rx, model, kind, time_limit)?;
        if !matches!(outcome, SolveOutcome::TimedOut) {
            debug!(
                model = %model.name,
                vars = model.num_vars(),
                constraints = model.num_constraints(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "solve finished"
            );
        }
        Ok(outcome)
    }
}

fn wait_for(
    rx: &Receiver<DnrResult<SolveOutcome>>,
    model: &Model,
    kind: BackendKind,
    time_limit: Duration,
) -> DnrResult<SolveOutcome> {
    match rx.recv_timeout(time_limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                model = %model.name,
                limit_ms = time_limit.as_millis() as u64,
                "solve exceeded its time limit"
            );
            Ok(SolveOutcome::TimedOut)
        }
        Err(RecvTimeoutError::Disconnected) => Err(DnrError::BackendUnavailable(format!(
            "{} worker for model {} stopped without a result",
            kind.as_str(),
            model.name
        ))),
    }
}

#[cfg_attr(not(feature = "solver-highs"), allow(unused_variables))]
fn solve_blocking(model: &Model, kind: BackendKind, time_limit: Duration) -> DnrResult<SolveOutcome> {
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = model
        .vars
        .iter()
        .map(|def| {
            let mut definition = variable().name(def.name.clone());
            match def.kind {
                VarKind::Binary => definition = definition.binary(),
                VarKind::Integer => definition = definition.integer(),
                VarKind::Continuous => {}
            }
            if def.lower.is_finite() {
                definition = definition.min(def.lower);
            }
            if def.upper.is_finite() {
                definition = definition.max(def.upper);
            }
            vars.add(definition)
        })
        .collect();

    let objective = to_expression(&model.objective, &handles);
    let unsolved = match model.sense {
        ObjectiveSense::Minimise => vars.minimise(objective),
        ObjectiveSense::Maximise => vars.maximise(objective),
    };

    let values = match kind {
        BackendKind::Microlp => solve_with(unsolved.using(microlp), model, &handles),
        #[cfg(feature = "solver-highs")]
        BackendKind::Highs => solve_with(
            unsolved
                .using(highs)
                .set_time_limit(time_limit.as_secs_f64()),
            model,
            &handles,
        ),
    };

    match values {
        Ok(Some(values)) => {
            let mut solution = Solution {
                values,
                objective: 0.0,
            };
            solution.objective = model.objective.evaluate(&solution);
            Ok(SolveOutcome::Optimal(solution))
        }
        Ok(None) => Ok(SolveOutcome::TimedOut),
        Err(err) => resolution_outcome(err, model, kind),
    }
}

fn resolution_outcome(err: ResolutionError, model: &Model, kind: BackendKind) -> DnrResult<SolveOutcome> {
    match err {
        ResolutionError::Infeasible => Ok(SolveOutcome::Infeasible("proven infeasible".to_string())),
        ResolutionError::Unbounded => Err(DnrError::Other(format!(
            "model {} is unbounded",
            model.name
        ))),
        other => Err(DnrError::BackendUnavailable(format!(
            "{} failed on model {}: {other}",
            kind.as_str(),
            model.name
        ))),
    }
}

/// Values of `handles`, or `None` when the solver stopped at its own limit.
fn solve_with<M>(
    mut problem: M,
    model: &Model,
    handles: &[Variable],
) -> Result<Option<Vec<f64>>, ResolutionError>
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in &model.constraints {
        let lhs = to_expression(&c.expr, handles);
        let rhs = c.rhs;
        problem = match c.relation {
            Relation::Le => problem.with(constraint!(lhs <= rhs)),
            Relation::Ge => problem.with(constraint!(lhs >= rhs)),
            Relation::Eq => problem.with(constraint!(lhs == rhs)),
        };
    }
    let solution = problem.solve()?;
    if matches!(solution.status(), SolutionStatus::TimeLimit) {
        return Ok(None);
    }
    Ok(Some(handles.iter().map(|v| solution.value(*v)).collect()))
}

fn to_expression(expr: &LinExpr, handles: &[Variable]) -> Expression {
    let mut out = Expression::from(expr.constant);
    for (var, coef) in &expr.terms {
        out += *coef * handles[var.index()];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{LinExpr, ModelBuilder};

    #[test]
    fn probe_passes_on_default_backend() {
        GoodLpBackend::default().probe().unwrap();
    }

    #[test]
    fn knapsack_picks_best_items() {
        let mut builder = ModelBuilder::new("knapsack");
        let values = [6.0, 5.0, 4.0];
        let weights = [3.0, 2.0, 2.0];
        let picks: Vec<_> = (0..3).map(|i| builder.binary(format!("pick{i}"))).collect();
        let mut weight = LinExpr::new();
        let mut value = LinExpr::new();
        for (i, pick) in picks.iter().enumerate() {
            weight.add_term(*pick, weights[i]);
            value.add_term(*pick, values[i]);
        }
        builder.le(weight, 4.0);
        builder.set_objective(ObjectiveSense::Maximise, value);
        let model = builder.build().unwrap();

        let outcome = GoodLpBackend::default()
            .solve(&model, Duration::from_secs(10))
            .unwrap();
        let SolveOutcome::Optimal(solution) = outcome else {
            panic!("expected optimal, got {outcome:?}");
        };
        assert!((solution.objective - 9.0).abs() < 1e-6);
        assert!(!solution.is_one(picks[0]));
        assert!(solution.is_one(picks[1]) && solution.is_one(picks[2]));
    }

    #[test]
    fn contradictory_bounds_are_infeasible() {
        let mut builder = ModelBuilder::new("contradiction");
        let x = builder.continuous("x", 0.0, 1.0);
        builder.ge(LinExpr::var(x), 2.0);
        builder.set_objective(ObjectiveSense::Minimise, LinExpr::var(x));
        let model = builder.build().unwrap();
        let outcome = GoodLpBackend::default()
            .solve(&model, Duration::from_secs(10))
            .unwrap();
        assert!(matches!(outcome, SolveOutcome::Infeasible(_)));
    }

    #[test]
    fn zero_time_limit_times_out() {
        let mut builder = ModelBuilder::new("instant");
        let x = builder.continuous("x", 0.0, 1.0);
        builder.set_objective(ObjectiveSense::Minimise, LinExpr::var(x));
        let model = builder.build().unwrap();
        let outcome = GoodLpBackend::default().solve(&model, Duration::ZERO).unwrap();
        assert_eq!(outcome, SolveOutcome::TimedOut);
    }

    fn tiny_model() -> Model {
        let mut builder = ModelBuilder::new("tiny");
        let x = builder.continuous("x", 0.0, 1.0);
        builder.set_objective(ObjectiveSense::Minimise, LinExpr::var(x));
        builder.build().unwrap()
    }

    #[test]
    fn dead_worker_is_not_infeasible() {
        let (tx, rx) = mpsc::channel::<DnrResult<SolveOutcome>>();
        drop(tx);
        let err = wait_for(&rx, &tiny_model(), BackendKind::Microlp, Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), "BACKEND_UNAVAILABLE");
    }

    #[test]
    fn only_proven_infeasibility_is_infeasible() {
        let model = tiny_model();
        let kind = BackendKind::Microlp;
        assert!(matches!(
            resolution_outcome(ResolutionError::Infeasible, &model, kind),
            Ok(SolveOutcome::Infeasible(_))
        ));
        let err = resolution_outcome(ResolutionError::Other("numerical failure"), &model, kind)
            .unwrap_err();
        assert_eq!(err.kind(), "BACKEND_UNAVAILABLE");
        assert!(err.to_string().contains("numerical failure"));
        let err = resolution_outcome(ResolutionError::Str("lost".into()), &model, kind).unwrap_err();
        assert_eq!(err.kind(), "BACKEND_UNAVAILABLE");
    }

    #[cfg(feature = "solver-highs")]
    #[test]
    fn highs_solves_under_its_own_time_limit() {
        let outcome =
            solve_blocking(&tiny_model(), BackendKind::Highs, Duration::from_secs(5)).unwrap();
        let SolveOutcome::Optimal(solution) = outcome else {
            panic!("expected optimal, got {outcome:?}");
        };
        assert!(solution.objective.abs() < 1e-6);
    }

    #[test]
    fn unknown_backend_is_unavailable() {
        let err = "gurobi".parse::<BackendKind>().unwrap_err();
        assert_eq!(err.kind(), "BACKEND_UNAVAILABLE");
        assert_eq!("MicroLP".parse::<BackendKind>().unwrap(), BackendKind::Microlp);
        assert!(BackendKind::available().contains(&"microlp"));
    }
}
