//! Lossless transport dispatch shared by the restoration and scheduling models.
//!
//! For one snapshot of usable branches the layer adds branch/converter flows,
//! substation and resource outputs, a served fraction per loaded bus and the
//! per-bus power balance. Callers may inject extra terms (MESS discharge) at a
//! bus before the balance rows are emitted.

use crate::lp::{LinExpr, ModelBuilder, Solution, VarId};
use dnr_core::{BranchId, BranchKind, BusId, Network};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy)]
pub(crate) enum FlowVars {
    /// Signed flow, positive from `from_bus` to `to_bus`
    Line(VarId),
    /// Directional sending-side flows; the receiving side gets `efficiency` of it
    Converter {
        forward: VarId,
        reverse: VarId,
        efficiency: f64,
    },
}

/// A usable branch and its switch variable; `None` means fixed closed.
pub(crate) type UsableBranch = (BranchId, Option<VarId>);

#[derive(Debug)]
pub(crate) struct DispatchLayer {
    pub live: BTreeSet<BusId>,
    pub served: BTreeMap<BusId, VarId>,
    pub flows: BTreeMap<BranchId, FlowVars>,
    injections: BTreeMap<BusId, LinExpr>,
}

/// Values read back from a solved dispatch layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReadout {
    /// Sending-side flow per usable branch, from `from_bus` to `to_bus`
    pub flows: BTreeMap<BranchId, f64>,
    /// Served MW per live bus
    pub bus_served: BTreeMap<BusId, f64>,
    pub served_mw: f64,
    /// Largest absolute power-balance mismatch over live buses
    pub max_balance_residual: f64,
}

/// Bound used for unrated branches: nothing can move more than all supply.
pub(crate) fn big_m(network: &Network) -> f64 {
    let supply: f64 = network
        .buses()
        .map(|b| b.gen_max.value().max(0.0))
        .chain(network.resources.iter().map(|r| r.p_max.value().abs().max(r.p_min.value().abs())))
        .sum();
    (network.total_load().value() + supply).max(1.0)
}

impl DispatchLayer {
    pub fn build(
        builder: &mut ModelBuilder,
        network: &Network,
        dead: &BTreeSet<BusId>,
        branches: &[UsableBranch],
        tag: &str,
    ) -> Self {
        let m = big_m(network);
        let live: BTreeSet<BusId> = network
            .bus_ids()
            .into_iter()
            .filter(|b| !dead.contains(b))
            .collect();
        let mut injections: BTreeMap<BusId, LinExpr> =
            live.iter().map(|b| (*b, LinExpr::new())).collect();
        let mut flows = BTreeMap::new();

        for &(id, switch) in branches {
            let Some(branch) = network.branch(id) else {
                continue;
            };
            if !live.contains(&branch.from_bus) || !live.contains(&branch.to_bus) {
                continue;
            }
            let cap = if branch.capacity.is_finite() {
                branch.capacity.value()
            } else {
                m
            };
            let vars = match branch.kind {
                BranchKind::Line => {
                    let p = builder.continuous(format!("{tag}_p_{}", id.value()), -cap, cap);
                    if let Some(x) = switch {
                        builder.le(LinExpr::var(p).term(x, -cap), 0.0);
                        builder.ge(LinExpr::var(p).term(x, cap), 0.0);
                    }
                    add(&mut injections, branch.from_bus, p, -1.0);
                    add(&mut injections, branch.to_bus, p, 1.0);
                    FlowVars::Line(p)
                }
                BranchKind::Converter => {
                    let forward = builder.continuous(format!("{tag}_pf_{}", id.value()), 0.0, cap);
                    let reverse = builder.continuous(format!("{tag}_pr_{}", id.value()), 0.0, cap);
                    if let Some(x) = switch {
                        builder.le(LinExpr::var(forward).term(x, -cap), 0.0);
                        builder.le(LinExpr::var(reverse).term(x, -cap), 0.0);
                    }
                    let eta = branch.efficiency;
                    add(&mut injections, branch.from_bus, forward, -1.0);
                    add(&mut injections, branch.from_bus, reverse, eta);
                    add(&mut injections, branch.to_bus, forward, eta);
                    add(&mut injections, branch.to_bus, reverse, -1.0);
                    FlowVars::Converter {
                        forward,
                        reverse,
                        efficiency: eta,
                    }
                }
            };
            flows.insert(id, vars);
        }

        for bus in network.buses().filter(|b| live.contains(&b.id)) {
            if bus.gen_max.value() > 0.0 {
                let g = builder.continuous(
                    format!("{tag}_g_{}", bus.id.value()),
                    bus.gen_min.value(),
                    bus.gen_max.value(),
                );
                add(&mut injections, bus.id, g, 1.0);
            }
        }
        for resource in network.resources.iter().filter(|r| live.contains(&r.bus)) {
            let r = builder.continuous(
                format!("{tag}_r_{}", resource.id.value()),
                resource.p_min.value(),
                resource.p_max.value(),
            );
            add(&mut injections, resource.bus, r, 1.0);
        }

        let mut served = BTreeMap::new();
        for bus in network.buses().filter(|b| live.contains(&b.id)) {
            if bus.load.value() > 0.0 {
                let s = builder.continuous(format!("{tag}_s_{}", bus.id.value()), 0.0, 1.0);
                served.insert(bus.id, s);
            }
        }

        Self {
            live,
            served,
            flows,
            injections,
        }
    }

    /// Add `coef · var` to the injection at `bus`; ignored for dead buses.
    pub fn inject(&mut self, bus: BusId, var: VarId, coef: f64) {
        if let Some(expr) = self.injections.get_mut(&bus) {
            expr.add_term(var, coef);
        }
    }

    /// Emit `injection − load · served = 0` for every live bus.
    pub fn add_balance(&self, builder: &mut ModelBuilder, network: &Network) {
        for (bus, injection) in &self.injections {
            let mut row = injection.clone();
            if let Some(s) = self.served.get(bus) {
                let load = network.bus(*bus).map_or(0.0, |b| b.load.value());
                row.add_term(*s, -load);
            }
            if !row.is_empty() {
                builder.eq(row, 0.0);
            }
        }
    }

    /// `Σ weight · load · served` over live buses.
    pub fn weighted_served(&self, network: &Network) -> LinExpr {
        let mut expr = LinExpr::new();
        for (bus, s) in &self.served {
            if let Some(b) = network.bus(*bus) {
                expr.add_term(*s, b.load_weight * b.load.value());
            }
        }
        expr
    }

    pub fn read(&self, solution: &Solution, network: &Network) -> DispatchReadout {
        let mut readout = DispatchReadout::default();
        for (id, vars) in &self.flows {
            let flow = match vars {
                FlowVars::Line(p) => solution.value(*p),
                FlowVars::Converter {
                    forward, reverse, ..
                } => solution.value(*forward) - solution.value(*reverse),
            };
            readout.flows.insert(*id, flow);
        }
        for bus in &self.live {
            let load = network.bus(*bus).map_or(0.0, |b| b.load.value());
            let fraction = self.served.get(bus).map_or(0.0, |s| solution.value(*s));
            let served = load * fraction;
            readout.bus_served.insert(*bus, served);
            readout.served_mw += served;
            let injection = self
                .injections
                .get(bus)
                .map_or(0.0, |expr| expr.evaluate(solution));
            let residual = (injection - served).abs();
            readout.max_balance_residual = readout.max_balance_residual.max(residual);
        }
        readout
    }
}

fn add(injections: &mut BTreeMap<BusId, LinExpr>, bus: BusId, var: VarId, coef: f64) {
    if let Some(expr) = injections.get_mut(&bus) {
        expr.add_term(var, coef);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{GoodLpBackend, ObjectiveSense, OptimizationBackend, SolveOutcome};
    use crate::test_utils::hybrid_feeder;
    use std::time::Duration;

    #[test]
    fn converter_losses_reduce_delivered_power() {
        let network = hybrid_feeder();
        let branches: Vec<UsableBranch> = network
            .branches()
            .filter(|b| !b.normally_open)
            .map(|b| (b.id, None))
            .collect();
        let mut builder = ModelBuilder::new("dispatch");
        let layer = DispatchLayer::build(&mut builder, &network, &BTreeSet::new(), &branches, "t");
        layer.add_balance(&mut builder, &network);
        builder.set_objective(ObjectiveSense::Maximise, layer.weighted_served(&network));
        let model = builder.build().unwrap();
        let SolveOutcome::Optimal(solution) = GoodLpBackend::default()
            .solve(&model, Duration::from_secs(10))
            .unwrap()
        else {
            panic!("dispatch should solve");
        };
        let readout = layer.read(&solution, &network);
        assert!(readout.max_balance_residual < 1e-6);
        assert!((readout.served_mw - network.total_load().value()).abs() < 1e-6);
    }
}
