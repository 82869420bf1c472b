//! Fault isolation MILP.
//!
//! Starting from the previous snapshot, only openings are allowed. A zone
//! indicator `z_i ∈ [0,1]` marks de-energized buses:
//!
//! - faulted buses and both ends of faulted non-switchable branches: `z_i = 1`
//! - healthy non-switchable branch `(i,j)`: `z_i = z_j`
//! - previously closed healthy switch `(i,j)` kept closed (`x = 1`):
//!   `z_i − z_j + x ≤ 1` and `z_j − z_i + x ≤ 1`
//!
//! Minimises `Σ z` over healthy buses plus a small cost per opened switch.

use crate::context::SolveContext;
use crate::lp::{LinExpr, ModelBuilder, ObjectiveSense, SolveOutcome, VarId};
use dnr_core::graph_utils::faulted_branches;
use dnr_core::{BranchId, BusId, Component, DnrResult, Network, SwitchConfig, SwitchState};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct IsolationResult {
    /// Previous snapshot with faulted branches and isolating switches opened
    pub config: SwitchConfig,
    /// Buses left de-energized, faulted buses included
    pub zone: BTreeSet<BusId>,
    /// Healthy switches opened to bound the zone
    pub opened: Vec<BranchId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IsolationOutcome {
    Isolated(IsolationResult),
    Infeasible(String),
    TimedOut,
}

pub struct IsolationProblem<'a> {
    pub network: &'a Network,
    pub previous: &'a SwitchConfig,
    pub outages: &'a BTreeSet<Component>,
    pub switching_cost: f64,
}

impl IsolationProblem<'_> {
    fn seeds(&self) -> BTreeSet<BusId> {
        let mut seeds = BTreeSet::new();
        for component in self.outages {
            match component {
                Component::Bus(id) if self.network.bus(*id).is_some() => {
                    seeds.insert(*id);
                }
                Component::Branch(id) => {
                    if let Some(branch) = self.network.branch(*id).filter(|b| !b.switchable) {
                        seeds.insert(branch.from_bus);
                        seeds.insert(branch.to_bus);
                    }
                }
                Component::Bus(_) => {}
            }
        }
        seeds
    }

    pub fn solve(&self, ctx: &SolveContext<'_>) -> DnrResult<IsolationOutcome> {
        let network = self.network;
        let faulted = faulted_branches(self.outages);
        let seeds = self.seeds();
        let mut builder = ModelBuilder::new("isolation");

        let zone: BTreeMap<BusId, VarId> = network
            .bus_ids()
            .into_iter()
            .map(|bus| {
                let z = builder.continuous(format!("z_{}", bus.value()), 0.0, 1.0);
                if seeds.contains(&bus) {
                    builder.fix(z, 1.0);
                }
                (bus, z)
            })
            .collect();

        let mut objective = LinExpr::new();
        for (bus, z) in &zone {
            if !seeds.contains(bus) {
                objective.add_term(*z, 1.0);
            }
        }

        let mut keep: BTreeMap<BranchId, VarId> = BTreeMap::new();
        for branch in network.branches() {
            if faulted.contains(&branch.id) {
                continue;
            }
            let (Some(&zi), Some(&zj)) = (zone.get(&branch.from_bus), zone.get(&branch.to_bus)) else {
                continue;
            };
            if !branch.switchable {
                builder.eq(LinExpr::var(zi).term(zj, -1.0), 0.0);
            } else if self.previous.is_closed(branch.id) {
                let x = builder.binary(format!("x_{}", branch.id.value()));
                builder.le(LinExpr::var(zi).term(zj, -1.0).term(x, 1.0), 1.0);
                builder.le(LinExpr::var(zj).term(zi, -1.0).term(x, 1.0), 1.0);
                objective.add_constant(self.switching_cost);
                objective.add_term(x, -self.switching_cost);
                keep.insert(branch.id, x);
            }
        }

        builder.set_objective(ObjectiveSense::Minimise, objective);
        let model = builder.build()?;
        let solution = match ctx.solve(&model)? {
            SolveOutcome::Optimal(solution) => solution,
            SolveOutcome::Infeasible(reason) => return Ok(IsolationOutcome::Infeasible(reason)),
            SolveOutcome::TimedOut => return Ok(IsolationOutcome::TimedOut),
        };

        let mut config = self.previous.clone();
        for id in &faulted {
            config.set(*id, SwitchState::Open);
        }
        let mut opened = Vec::new();
        for (id, x) in &keep {
            if !solution.is_one(*x) {
                config.set(*id, SwitchState::Open);
                opened.push(*id);
            }
        }
        let mut isolated: BTreeSet<BusId> = zone
            .iter()
            .filter(|(_, z)| solution.value(**z) > 0.5)
            .map(|(bus, _)| *bus)
            .collect();
        isolated.extend(seeds);

        Ok(IsolationOutcome::Isolated(IsolationResult {
            config,
            zone: isolated,
            opened,
        }))
    }
}
