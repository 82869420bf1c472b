//! Restoration MILP shared by the post-fault and post-repair stages.
//!
//! ## Formulation
//!
//! Over the live buses `A` (not inside a fault zone):
//!
//! - `x_b ∈ {0,1}` per usable switchable branch; healthy non-switchable
//!   branches are fixed closed, faulted branches and branches touching a dead
//!   bus are fixed open
//! - `y_i ∈ {0,1}` virtual-root edges at source buses; substations are forced
//!   roots (`y_i = 1`)
//! - spanning forest: `Σ x_b + Σ y_i = |A|`
//! - single-commodity connectivity flow: the virtual root ships one unit to
//!   every live bus over closed branches, so every live bus is energized and
//!   the closed branches form one tree per root
//! - live junctions (no load, no source) may stay dark: their commodity demand
//!   is a binary `z_i`, counted in the forest size, and every branch touching
//!   one is closed only if `z_i = 1`
//! - lossless transport flows within `capacity · x_b`, converters with
//!   efficiency, source bounds and served fractions (see [`crate::dispatch`])
//!
//! The objective maximises priority-weighted served load minus
//! `switching_cost` per operation against the previous snapshot and, after
//! repair, `revert_cost` per branch left away from its normal state.

use crate::context::SolveContext;
use crate::dispatch::{DispatchLayer, DispatchReadout, UsableBranch};
use crate::lp::{LinExpr, ModelBuilder, ObjectiveSense, SolveOutcome, VarId};
use dnr_core::graph_utils::sourced_reach;
use dnr_core::{Branch, BranchId, BusId, DnrResult, Network, SwitchConfig, SwitchState};
use std::collections::{BTreeMap, BTreeSet};

/// How switch states are treated by the restoration model.
#[derive(Debug, Clone, Copy)]
pub enum TopologyMode<'a> {
    /// Switch states are given; only the dispatch is optimized.
    Fixed(&'a SwitchConfig),
    /// Switch states are optimized under radiality with every live bus energized.
    Reconfigure {
        previous: &'a SwitchConfig,
        switching_cost: f64,
        /// Normal configuration and the cost per branch away from it
        revert: Option<(&'a SwitchConfig, f64)>,
        max_tie_operations: Option<u32>,
    },
}

#[derive(Debug, Clone)]
pub struct RestorationProblem<'a> {
    pub name: String,
    pub network: &'a Network,
    /// Buses inside fault zones
    pub dead: &'a BTreeSet<BusId>,
    pub faulted: &'a BTreeSet<BranchId>,
    pub mode: TopologyMode<'a>,
}

#[derive(Debug, Clone)]
pub struct RestorationResult {
    pub config: SwitchConfig,
    pub dispatch: DispatchReadout,
}

#[derive(Debug, Clone)]
pub enum RestorationOutcome {
    Solved(RestorationResult),
    Infeasible(String),
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
enum SwitchVar {
    Fixed(bool),
    Free(VarId),
}

impl RestorationProblem<'_> {
    fn usable(&self, branch: &Branch) -> bool {
        !self.faulted.contains(&branch.id)
            && !self.dead.contains(&branch.from_bus)
            && !self.dead.contains(&branch.to_bus)
    }

    /// Live bus with neither load nor supply; it need not be energized.
    fn is_junction(&self, bus: BusId) -> bool {
        !self.network.is_source(bus)
            && self.network.bus(bus).is_some_and(|b| b.load.value() <= 0.0)
    }

    /// Live load buses no source can reach over any healthy branch.
    pub fn unreachable_buses(&self) -> BTreeSet<BusId> {
        let reach = sourced_reach(self.network, self.dead, |b| self.usable(b));
        self.network
            .bus_ids()
            .into_iter()
            .filter(|b| !self.dead.contains(b) && !reach.contains(b) && !self.is_junction(*b))
            .collect()
    }

    pub fn solve(&self, ctx: &SolveContext<'_>) -> DnrResult<RestorationOutcome> {
        let network = self.network;
        let reconfigure = matches!(self.mode, TopologyMode::Reconfigure { .. });

        if reconfigure {
            let stranded = self.unreachable_buses();
            if let Some(first) = stranded.iter().next() {
                return Ok(RestorationOutcome::Infeasible(format!(
                    "{} cannot be energized from any live source ({} stranded bus{})",
                    first,
                    stranded.len(),
                    if stranded.len() == 1 { "" } else { "es" }
                )));
            }
        }

        let live: Vec<BusId> = network
            .bus_ids()
            .into_iter()
            .filter(|b| !self.dead.contains(b))
            .collect();
        let mut builder = ModelBuilder::new(self.name.clone());

        let mut switches: BTreeMap<BranchId, SwitchVar> = BTreeMap::new();
        for id in network.branch_ids() {
            let Some(branch) = network.branch(id) else {
                continue;
            };
            let var = if !self.usable(branch) {
                SwitchVar::Fixed(false)
            } else {
                match self.mode {
                    TopologyMode::Fixed(config) => SwitchVar::Fixed(config.is_closed(id)),
                    TopologyMode::Reconfigure { .. } if !branch.switchable => SwitchVar::Fixed(true),
                    TopologyMode::Reconfigure { .. } => {
                        SwitchVar::Free(builder.binary(format!("x_{}", id.value())))
                    }
                }
            };
            switches.insert(id, var);
        }

        if live.is_empty() {
            return Ok(RestorationOutcome::Solved(RestorationResult {
                config: to_config(&switches, None),
                dispatch: DispatchReadout::default(),
            }));
        }

        let usable: Vec<UsableBranch> = switches
            .iter()
            .filter_map(|(id, var)| match var {
                SwitchVar::Fixed(true) => Some((*id, None)),
                SwitchVar::Fixed(false) => None,
                SwitchVar::Free(x) => Some((*id, Some(*x))),
            })
            .collect();
        let layer = DispatchLayer::build(&mut builder, network, self.dead, &usable, "d");
        layer.add_balance(&mut builder, network);
        let mut objective = layer.weighted_served(network);

        if let TopologyMode::Reconfigure {
            previous,
            switching_cost,
            revert,
            max_tie_operations,
        } = self.mode
        {
            self.add_radiality(&mut builder, &live, &usable);

            let prev_ops = operations(&switches, previous);
            objective.add_scaled(&prev_ops, -switching_cost);
            if let Some((normal, revert_cost)) = revert {
                objective.add_scaled(&operations(&switches, normal), -revert_cost);
            }
            if let Some(limit) = max_tie_operations {
                let ties: BTreeMap<BranchId, SwitchVar> = switches
                    .iter()
                    .filter(|(id, _)| network.branch(**id).is_some_and(|b| b.is_tie()))
                    .map(|(id, v)| (*id, *v))
                    .collect();
                builder.le(operations(&ties, previous), limit as f64);
            }
        }

        builder.set_objective(ObjectiveSense::Maximise, objective);
        let model = builder.build()?;
        match ctx.solve(&model)? {
            SolveOutcome::Optimal(solution) => {
                let config = to_config(&switches, Some(&solution));
                let dispatch = layer.read(&solution, network);
                Ok(RestorationOutcome::Solved(RestorationResult { config, dispatch }))
            }
            SolveOutcome::Infeasible(reason) => Ok(RestorationOutcome::Infeasible(reason)),
            SolveOutcome::TimedOut => Ok(RestorationOutcome::TimedOut),
        }
    }

    fn add_radiality(&self, builder: &mut ModelBuilder, live: &[BusId], usable: &[UsableBranch]) {
        let network = self.network;
        let n = live.len() as f64;

        let mut edge_count = LinExpr::new();
        let mut bus_count = LinExpr::new();
        let mut demand: BTreeMap<BusId, LinExpr> = BTreeMap::new();
        for &bus in live {
            if self.is_junction(bus) {
                let z = builder.binary(format!("z_{}", bus.value()));
                bus_count.add_term(z, 1.0);
                demand.insert(bus, LinExpr::var(z));
            } else {
                bus_count.add_constant(1.0);
                demand.insert(bus, LinExpr::constant(1.0));
            }
        }
        let mut net_inflow: BTreeMap<BusId, LinExpr> =
            live.iter().map(|b| (*b, LinExpr::new())).collect();

        for &(id, switch) in usable {
            let Some(branch) = network.branch(id) else {
                continue;
            };
            let f = builder.continuous(format!("cf_{}", id.value()), -n, n);
            let closed = match switch {
                Some(x) => {
                    edge_count.add_term(x, 1.0);
                    builder.le(LinExpr::var(f).term(x, -n), 0.0);
                    builder.ge(LinExpr::var(f).term(x, n), 0.0);
                    LinExpr::var(x)
                }
                None => {
                    edge_count.add_constant(1.0);
                    LinExpr::constant(1.0)
                }
            };
            for end in [branch.from_bus, branch.to_bus] {
                // closed ≤ z_end
                if let Some(z) = demand.get(&end).filter(|d| !d.is_empty()) {
                    let mut link = closed.clone();
                    link.add_scaled(z, -1.0);
                    builder.le(link, 0.0);
                }
            }
            if let Some(expr) = net_inflow.get_mut(&branch.from_bus) {
                expr.add_term(f, -1.0);
            }
            if let Some(expr) = net_inflow.get_mut(&branch.to_bus) {
                expr.add_term(f, 1.0);
            }
        }

        for bus in live {
            if !network.is_source(*bus) {
                continue;
            }
            let forced = network.bus(*bus).is_some_and(|b| b.is_substation());
            let y = builder.binary(format!("y_{}", bus.value()));
            if forced {
                builder.fix(y, 1.0);
            }
            edge_count.add_term(y, 1.0);
            let h = builder.continuous(format!("rf_{}", bus.value()), 0.0, n);
            builder.le(LinExpr::var(h).term(y, -n), 0.0);
            if let Some(expr) = net_inflow.get_mut(bus) {
                expr.add_term(h, 1.0);
            }
        }

        edge_count.add_scaled(&bus_count, -1.0);
        builder.eq(edge_count, 0.0);
        for (bus, mut inflow) in net_inflow {
            if let Some(d) = demand.get(&bus) {
                inflow.add_scaled(d, -1.0);
            }
            builder.eq(inflow, 0.0);
        }
    }
}

/// Number of branches whose state differs from `reference`, as a linear expression.
fn operations(switches: &BTreeMap<BranchId, SwitchVar>, reference: &SwitchConfig) -> LinExpr {
    let mut ops = LinExpr::new();
    for (id, var) in switches {
        let was_closed = reference.is_closed(*id);
        match (var, was_closed) {
            (SwitchVar::Fixed(closed), _) if *closed != was_closed => ops.add_constant(1.0),
            (SwitchVar::Fixed(_), _) => {}
            (SwitchVar::Free(x), true) => {
                ops.add_constant(1.0);
                ops.add_term(*x, -1.0);
            }
            (SwitchVar::Free(x), false) => ops.add_term(*x, 1.0),
        }
    }
    ops
}

fn to_config(
    switches: &BTreeMap<BranchId, SwitchVar>,
    solution: Option<&crate::lp::Solution>,
) -> SwitchConfig {
    let mut config = SwitchConfig::default();
    for (id, var) in switches {
        let closed = match var {
            SwitchVar::Fixed(closed) => *closed,
            SwitchVar::Free(x) => solution.is_some_and(|s| s.is_one(*x)),
        };
        config.set(*id, SwitchState::from_closed(closed));
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::GoodLpBackend;
    use crate::test_utils::{five_bus_radial, radial_without_backup};
    use dnr_core::graph_utils::{energized_buses, radiality};
    use dnr_core::{Bus, Domain};
    use std::time::Duration;

    fn ctx(backend: &GoodLpBackend) -> SolveContext<'_> {
        SolveContext::new(backend, Duration::from_secs(30), Duration::from_secs(60))
    }

    #[test]
    fn revert_cost_pulls_back_to_normal() {
        let network = five_bus_radial();
        let backend = GoodLpBackend::default();
        let normal = SwitchConfig::normal(&network);
        let mut isolated = normal.clone();
        isolated.set(BranchId::new(2), SwitchState::Open);

        let dead = BTreeSet::new();
        let faulted = BTreeSet::new();
        let problem = RestorationProblem {
            name: "post_fault".into(),
            network: &network,
            dead: &dead,
            faulted: &faulted,
            mode: TopologyMode::Reconfigure {
                previous: &isolated,
                switching_cost: 1e-3,
                revert: Some((&normal, 1e-2)),
                max_tie_operations: None,
            },
        };
        let RestorationOutcome::Solved(result) = problem.solve(&ctx(&backend)).unwrap() else {
            panic!("restoration should solve");
        };
        assert!(result.config.is_closed(BranchId::new(2)));
        assert_eq!(result.config, normal);
        assert!((result.dispatch.served_mw - network.total_load().value()).abs() < 1e-6);
        assert!(result.dispatch.max_balance_residual < 1e-6);

        let energized = energized_buses(&network, &result.config, &dead);
        assert_eq!(energized.len(), 5);
        assert!(radiality(&network, &result.config, &energized).is_radial());
    }

    #[test]
    fn persistent_fault_keeps_dg_island_radial() {
        let network = five_bus_radial();
        let backend = GoodLpBackend::default();
        let normal = SwitchConfig::normal(&network);
        let dead = BTreeSet::new();
        let faulted = BTreeSet::from([BranchId::new(2)]);
        let problem = RestorationProblem {
            name: "post_fault".into(),
            network: &network,
            dead: &dead,
            faulted: &faulted,
            mode: TopologyMode::Reconfigure {
                previous: &normal,
                switching_cost: 1e-3,
                revert: None,
                max_tie_operations: None,
            },
        };
        let RestorationOutcome::Solved(result) = problem.solve(&ctx(&backend)).unwrap() else {
            panic!("restoration should solve");
        };
        assert!(!result.config.is_closed(BranchId::new(2)));
        let energized = energized_buses(&network, &result.config, &dead);
        assert_eq!(energized.len(), 5, "the DG roots the downstream island");
        let report = radiality(&network, &result.config, &energized);
        assert!(report.is_radial());
        assert_eq!(report.sourced_subtrees, 2);
        assert!(result.dispatch.max_balance_residual < 1e-6);
    }

    #[test]
    fn stranded_bus_is_infeasible_without_solve() {
        let network = radial_without_backup();
        let backend = GoodLpBackend::default();
        let normal = SwitchConfig::normal(&network);
        let dead = BTreeSet::new();
        let faulted = BTreeSet::from([BranchId::new(2)]);
        let problem = RestorationProblem {
            name: "post_fault".into(),
            network: &network,
            dead: &dead,
            faulted: &faulted,
            mode: TopologyMode::Reconfigure {
                previous: &normal,
                switching_cost: 1e-3,
                revert: None,
                max_tie_operations: None,
            },
        };
        assert_eq!(problem.unreachable_buses().len(), 3);
        match problem.solve(&ctx(&backend)).unwrap() {
            RestorationOutcome::Infeasible(reason) => assert!(reason.contains("Bus 3")),
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn stranded_junction_may_stay_dark() {
        // 1(sub) -b1- 2(load) -b2- 3(junction) -b3- 4(junction)
        let mut network = Network::new();
        for bus in [
            Bus::new(BusId::new(1), "sub", Domain::Ac).with_generation(0.0, 10.0),
            Bus::new(BusId::new(2), "load", Domain::Ac).with_load(0.8),
            Bus::new(BusId::new(3), "junction", Domain::Ac),
            Bus::new(BusId::new(4), "spur", Domain::Ac),
        ] {
            network.add_bus(bus).unwrap();
        }
        for (id, from, to) in [(1, 1, 2), (2, 2, 3), (3, 3, 4)] {
            network
                .add_branch(
                    Branch::new(BranchId::new(id), format!("{from}-{to}"), BusId::new(from), BusId::new(to))
                        .with_capacity(5.0)
                        .switchable(),
                )
                .unwrap();
        }
        let backend = GoodLpBackend::default();
        let normal = SwitchConfig::normal(&network);
        let dead = BTreeSet::new();
        let faulted = BTreeSet::from([BranchId::new(2)]);
        let problem = RestorationProblem {
            name: "post_fault".into(),
            network: &network,
            dead: &dead,
            faulted: &faulted,
            mode: TopologyMode::Reconfigure {
                previous: &normal,
                switching_cost: 1e-3,
                revert: None,
                max_tie_operations: None,
            },
        };
        assert!(problem.unreachable_buses().is_empty());
        let RestorationOutcome::Solved(result) = problem.solve(&ctx(&backend)).unwrap() else {
            panic!("a dark junction loses no load");
        };
        assert!((result.dispatch.served_mw - 0.8).abs() < 1e-6);
        assert!(!result.config.is_closed(BranchId::new(2)));
        assert!(!result.config.is_closed(BranchId::new(3)));
        let energized = energized_buses(&network, &result.config, &dead);
        assert!(!energized.contains(&BusId::new(3)));
        assert!(radiality(&network, &result.config, &energized).is_radial());
    }

    #[test]
    fn fixed_mode_only_dispatches() {
        let network = radial_without_backup();
        let backend = GoodLpBackend::default();
        let mut config = SwitchConfig::normal(&network);
        config.set(BranchId::new(2), SwitchState::Open);
        let dead = BTreeSet::new();
        let faulted = BTreeSet::from([BranchId::new(2)]);
        let problem = RestorationProblem {
            name: "isolation_dispatch".into(),
            network: &network,
            dead: &dead,
            faulted: &faulted,
            mode: TopologyMode::Fixed(&config),
        };
        let RestorationOutcome::Solved(result) = problem.solve(&ctx(&backend)).unwrap() else {
            panic!("fixed dispatch should solve");
        };
        assert_eq!(result.config, config);
        // Only buses 1 and 2 remain supplied.
        assert!((result.dispatch.served_mw - 1.0).abs() < 1e-6);
        assert_eq!(result.dispatch.flows.get(&BranchId::new(2)), None);
    }

    #[test]
    fn operation_counting() {
        let mut reference = SwitchConfig::default();
        reference.set(BranchId::new(1), SwitchState::Closed);
        reference.set(BranchId::new(2), SwitchState::Open);
        let switches = BTreeMap::from([
            (BranchId::new(1), SwitchVar::Fixed(false)),
            (BranchId::new(2), SwitchVar::Fixed(false)),
        ]);
        let ops = operations(&switches, &reference);
        assert_eq!(ops.constant, 1.0);
        assert!(ops.terms.is_empty());
    }
}
