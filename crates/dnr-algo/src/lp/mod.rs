//! Solver-agnostic mixed-integer linear models.
//!
//! Restoration and scheduling models are written against [`ModelBuilder`] and
//! solved through an [`OptimizationBackend`], so no algorithm module touches a
//! concrete solver's types. The only implementation shipped is
//! [`GoodLpBackend`], selected by [`BackendKind`].
//!
//! ```
//! use dnr_algo::lp::{LinExpr, ModelBuilder, ObjectiveSense, VarKind};
//!
//! let mut builder = ModelBuilder::new("example");
//! let x = builder.add_var("x", VarKind::Continuous, 0.0, 4.0);
//! let y = builder.add_var("y", VarKind::Binary, 0.0, 1.0);
//! builder.le(LinExpr::new().term(x, 1.0).term(y, -4.0), 0.0);
//! builder.set_objective(ObjectiveSense::Maximise, LinExpr::new().term(x, 1.0).term(y, -0.5));
//! let model = builder.build().unwrap();
//! assert_eq!(model.num_vars(), 2);
//! assert_eq!(model.num_integer_vars(), 1);
//! ```

use dnr_core::{DnrError, DnrResult};
use std::time::Duration;

mod good_lp_backend;

pub use good_lp_backend::{BackendKind, GoodLpBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
    Integer,
}

#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

/// Linear expression `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn var(var: VarId) -> Self {
        Self::new().term(var, 1.0)
    }

    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.add_term(var, coef);
        self
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Add `scale · other` to this expression.
    pub fn add_scaled(&mut self, other: &LinExpr, scale: f64) {
        for (var, coef) in &other.terms {
            self.add_term(*var, coef * scale);
        }
        self.constant += other.constant * scale;
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, solution: &Solution) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * solution.value(*var))
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

/// `expr (<=|>=|==) rhs`
#[derive(Debug, Clone)]
pub struct LinConstraint {
    pub expr: LinExpr,
    pub relation: Relation,
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    Minimise,
    Maximise,
}

#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    vars: Vec<VarDef>,
    constraints: Vec<LinConstraint>,
    sense: ObjectiveSense,
    objective: LinExpr,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
            constraints: Vec::new(),
            sense: ObjectiveSense::Minimise,
            objective: LinExpr::new(),
        }
    }

    pub fn add_var(&mut self, name: impl Into<String>, kind: VarKind, lower: f64, upper: f64) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarDef {
            name: name.into(),
            kind,
            lower,
            upper,
        });
        id
    }

    pub fn continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.add_var(name, VarKind::Continuous, lower, upper)
    }

    pub fn binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarKind::Binary, 0.0, 1.0)
    }

    /// Tighten the bounds of an existing variable.
    pub fn fix(&mut self, var: VarId, value: f64) {
        if let Some(def) = self.vars.get_mut(var.0) {
            def.lower = value;
            def.upper = value;
        }
    }

    pub fn add_constraint(&mut self, expr: LinExpr, relation: Relation, rhs: f64) {
        // Constants are folded into the right-hand side.
        let rhs = rhs - expr.constant;
        let expr = LinExpr {
            terms: expr.terms,
            constant: 0.0,
        };
        self.constraints.push(LinConstraint { expr, relation, rhs });
    }

    pub fn le(&mut self, expr: LinExpr, rhs: f64) {
        self.add_constraint(expr, Relation::Le, rhs);
    }

    pub fn ge(&mut self, expr: LinExpr, rhs: f64) {
        self.add_constraint(expr, Relation::Ge, rhs);
    }

    pub fn eq(&mut self, expr: LinExpr, rhs: f64) {
        self.add_constraint(expr, Relation::Eq, rhs);
    }

    pub fn set_objective(&mut self, sense: ObjectiveSense, objective: LinExpr) {
        self.sense = sense;
        self.objective = objective;
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Check bounds and coefficients, then freeze the model.
    pub fn build(self) -> DnrResult<Model> {
        for def in &self.vars {
            if def.lower.is_nan() || def.upper.is_nan() || def.lower > def.upper {
                return Err(DnrError::Other(format!(
                    "model {}: variable {} has invalid bounds [{}, {}]",
                    self.name, def.name, def.lower, def.upper
                )));
            }
            if def.kind == VarKind::Binary && (def.lower < 0.0 || def.upper > 1.0) {
                return Err(DnrError::Other(format!(
                    "model {}: binary variable {} bounded outside [0, 1]",
                    self.name, def.name
                )));
            }
        }
        let n = self.vars.len();
        let exprs = self
            .constraints
            .iter()
            .map(|c| (&c.expr, c.rhs))
            .chain(std::iter::once((&self.objective, 0.0)));
        for (expr, rhs) in exprs {
            if !rhs.is_finite() {
                return Err(DnrError::Other(format!(
                    "model {}: non-finite right-hand side",
                    self.name
                )));
            }
            for (var, coef) in &expr.terms {
                if var.0 >= n || !coef.is_finite() {
                    return Err(DnrError::Other(format!(
                        "model {}: bad term on variable #{}",
                        self.name, var.0
                    )));
                }
            }
        }
        Ok(Model {
            name: self.name,
            vars: self.vars,
            constraints: self.constraints,
            sense: self.sense,
            objective: self.objective,
        })
    }
}

/// A validated model, ready for any backend.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub vars: Vec<VarDef>,
    pub constraints: Vec<LinConstraint>,
    pub sense: ObjectiveSense,
    pub objective: LinExpr,
}

impl Model {
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_integer_vars(&self) -> usize {
        self.vars
            .iter()
            .filter(|v| v.kind != VarKind::Continuous)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub values: Vec<f64>,
    pub objective: f64,
}

impl Solution {
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }

    /// Binary read with rounding tolerance.
    pub fn is_one(&self, var: VarId) -> bool {
        self.value(var) > 0.5
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Optimal(Solution),
    /// Proven infeasible; solver failures are errors, never this variant
    Infeasible(String),
    /// Time limit hit; feasibility unknown
    TimedOut,
}

/// A mixed-integer solver capability.
pub trait OptimizationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Solve `model` within `time_limit`.
    ///
    /// A backend that crashes or reports an error other than infeasibility
    /// returns [`DnrError::BackendUnavailable`].
    fn solve(&self, model: &Model, time_limit: Duration) -> DnrResult<SolveOutcome>;

    /// Solve a trivial model to confirm the backend works at all.
    fn probe(&self) -> DnrResult<()> {
        let mut builder = ModelBuilder::new("probe");
        let x = builder.continuous("x", 0.0, 1.0);
        let y = builder.binary("y");
        builder.le(LinExpr::new().term(x, 1.0).term(y, -1.0), 0.0);
        builder.set_objective(
            ObjectiveSense::Maximise,
            LinExpr::new().term(x, 1.0).term(y, -0.25),
        );
        let model = builder.build()?;
        match self.solve(&model, Duration::from_secs(10))? {
            SolveOutcome::Optimal(solution) if (solution.objective - 0.75).abs() < 1e-6 => Ok(()),
            SolveOutcome::Optimal(solution) => Err(DnrError::BackendUnavailable(format!(
                "{} returned objective {} on the probe model",
                self.name(),
                solution.objective
            ))),
            other => Err(DnrError::BackendUnavailable(format!(
                "{} failed the probe model: {other:?}",
                self.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_fold_into_rhs() {
        let mut builder = ModelBuilder::new("t");
        let x = builder.continuous("x", 0.0, 10.0);
        builder.le(LinExpr::constant(2.0).term(x, 1.0), 5.0);
        let model = builder.build().unwrap();
        assert_eq!(model.constraints[0].rhs, 3.0);
        assert_eq!(model.constraints[0].expr.constant, 0.0);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut builder = ModelBuilder::new("t");
        builder.continuous("x", 2.0, 1.0);
        assert!(builder.build().is_err());

        let mut builder = ModelBuilder::new("t");
        builder.add_var("b", VarKind::Binary, 0.0, 2.0);
        assert!(builder.build().is_err());
    }

    #[test]
    fn zero_terms_are_dropped_and_expressions_evaluate() {
        let x = VarId(0);
        let y = VarId(1);
        let mut expr = LinExpr::new().term(x, 2.0).term(y, 0.0);
        expr.add_scaled(&LinExpr::constant(1.0).term(y, 1.0), 3.0);
        assert_eq!(expr.terms.len(), 2);
        let solution = Solution {
            values: vec![1.5, 2.0],
            objective: 0.0,
        };
        assert_eq!(expr.evaluate(&solution), 2.0 * 1.5 + 3.0 * 2.0 + 3.0);
    }
}
