//! Coordinated scheduling of mobile energy storage over the recovery horizon.
//!
//! The topology of every step is fixed by the [`RollingPlan`]; this model
//! decides where each MESS unit parks, how much it charges or discharges and
//! how much load is served. Per unit `k`, station `i` and step `t`:
//!
//! - `a[k,i,t] ∈ {0,1}` parking, `Σ_i a[k,i,t] ≤ 1`, zero at isolated stations
//! - `0 ≤ c, d ≤ Pmax · a` charge/discharge at the parked station
//! - `e[k,t] = e[k,t−1] + Δt · (η_c · Σc − Σd / η_d)`, `soc_min ≤ e ≤ E`
//! - travel: parking at `i` at `t` excludes `j ≠ i` during `t+1 ..= t+τ_ij`
//!
//! The objective minimises weighted unserved energy plus a cycling penalty.

use crate::config::MessConfig;
use crate::context::SolveContext;
use crate::dispatch::{DispatchLayer, UsableBranch};
use crate::lp::{LinExpr, ModelBuilder, ObjectiveSense, SolveOutcome, VarId};
use crate::reconfig::RollingPlan;
use dnr_core::graph_utils::{fault_zone, faulted_branches};
use dnr_core::{BusId, DnrResult, MessId, Network};
use dnr_scenarios::Scenario;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Keeps idle units reported at a station rather than in transit.
const PARKING_REWARD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitLocation {
    Parked(BusId),
    InTransit,
}

impl fmt::Display for UnitLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitLocation::Parked(bus) => write!(f, "bus:{}", bus.value()),
            UnitLocation::InTransit => f.write_str("in_transit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEntry {
    pub time_step: usize,
    pub unit: MessId,
    pub location: UnitLocation,
    /// Net injection into the grid (discharge − charge)
    pub power_mw: f64,
    pub soc_mwh: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchSchedule {
    /// First step of the recovery horizon; `None` when nothing failed
    pub start_step: Option<usize>,
    pub entries: Vec<DispatchEntry>,
    pub served_mw: BTreeMap<usize, f64>,
    pub unserved_mwh: f64,
    pub weighted_unserved_mwh: f64,
    pub max_balance_residual: f64,
}

impl DispatchSchedule {
    pub fn entries_for(&self, unit: MessId) -> impl Iterator<Item = &DispatchEntry> {
        self.entries.iter().filter(move |e| e.unit == unit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessOutcome {
    Scheduled(DispatchSchedule),
    Infeasible(String),
    TimedOut,
}

struct UnitVars {
    parking: BTreeMap<(BusId, usize), VarId>,
    charge: BTreeMap<(BusId, usize), VarId>,
    discharge: BTreeMap<(BusId, usize), VarId>,
    soc: BTreeMap<usize, VarId>,
}

pub struct MessScheduler<'a> {
    network: &'a Network,
    config: &'a MessConfig,
}

impl<'a> MessScheduler<'a> {
    pub fn new(network: &'a Network, config: &'a MessConfig) -> Self {
        Self { network, config }
    }

    pub fn schedule(
        &self,
        scenario: &Scenario,
        plan: &RollingPlan,
        ctx: &SolveContext<'_>,
    ) -> DnrResult<MessOutcome> {
        let network = self.network;
        let Some(start) = scenario.first_fault_step() else {
            return Ok(MessOutcome::Scheduled(DispatchSchedule::default()));
        };
        let steps: Vec<usize> = (start..scenario.horizon()).collect();
        let horizon_len = steps.len();
        let dt = self.config.step_hours;
        let stations: Vec<BusId> = network.mess_stations().into_iter().collect();

        let mut builder = ModelBuilder::new(format!("mess_{}", scenario.id));
        let mut objective = LinExpr::new();
        let mut layers = Vec::with_capacity(horizon_len);
        let mut dead_by_step = Vec::with_capacity(horizon_len);

        for &t in &steps {
            let outages = scenario.outages_at(t).cloned().unwrap_or_default();
            let dead = fault_zone(network, &outages);
            let faulted = faulted_branches(&outages);
            let config = plan.config_for_step(t);
            let usable: Vec<UsableBranch> = config
                .closed_branches()
                .filter(|id| !faulted.contains(id))
                .map(|id| (id, None))
                .collect();
            let layer = DispatchLayer::build(&mut builder, network, &dead, &usable, &format!("t{t}"));
            for (bus, s) in &layer.served {
                if let Some(b) = network.bus(*bus) {
                    let energy = b.load_weight * b.load.value() * dt;
                    objective.add_constant(energy);
                    objective.add_term(*s, -energy);
                }
            }
            layers.push(layer);
            dead_by_step.push(dead);
        }

        let mut units = BTreeMap::new();
        for unit in &network.mess_units {
            let mut vars = UnitVars {
                parking: BTreeMap::new(),
                charge: BTreeMap::new(),
                discharge: BTreeMap::new(),
                soc: BTreeMap::new(),
            };
            let p_max = unit.power_max.value();
            let tag = unit.id.value();
            let mut previous_soc: Option<VarId> = None;

            for (k, &t) in steps.iter().enumerate() {
                let mut parked = LinExpr::new();
                let mut net_charge = LinExpr::new();
                for &station in &stations {
                    let a = builder.binary(format!("a_{tag}_{}_{t}", station.value()));
                    let reachable = self.reachable_at(unit.initial_bus, station, t - start);
                    if dead_by_step[k].contains(&station) || !reachable {
                        builder.fix(a, 0.0);
                    }
                    let c = builder.continuous(format!("c_{tag}_{}_{t}", station.value()), 0.0, p_max);
                    let d = builder.continuous(format!("d_{tag}_{}_{t}", station.value()), 0.0, p_max);
                    builder.le(LinExpr::var(c).term(a, -p_max), 0.0);
                    builder.le(LinExpr::var(d).term(a, -p_max), 0.0);
                    layers[k].inject(station, d, 1.0);
                    layers[k].inject(station, c, -1.0);

                    parked.add_term(a, 1.0);
                    net_charge.add_term(c, dt * unit.charge_efficiency);
                    net_charge.add_term(d, -dt / unit.discharge_efficiency);
                    objective.add_term(c, self.config.cycling_penalty * dt);
                    objective.add_term(d, self.config.cycling_penalty * dt);
                    objective.add_term(a, -PARKING_REWARD);

                    vars.parking.insert((station, t), a);
                    vars.charge.insert((station, t), c);
                    vars.discharge.insert((station, t), d);
                }
                builder.le(parked, 1.0);

                let e = builder.continuous(
                    format!("e_{tag}_{t}"),
                    unit.soc_min.value(),
                    unit.energy_capacity.value(),
                );
                // e_t − e_{t−1} − net_charge = 0
                let mut continuity = LinExpr::var(e);
                match previous_soc {
                    Some(prev) => continuity.add_term(prev, -1.0),
                    None => continuity.add_constant(-unit.initial_soc.value()),
                }
                continuity.add_scaled(&net_charge, -1.0);
                builder.eq(continuity, 0.0);
                vars.soc.insert(t, e);
                previous_soc = Some(e);
            }

            self.add_travel(&mut builder, &vars, &stations, &steps);
            units.insert(unit.id, vars);
        }

        if self.config.exclusive_stations && units.len() > 1 {
            for &station in &stations {
                for &t in &steps {
                    let mut occupancy = LinExpr::new();
                    for vars in units.values() {
                        if let Some(a) = vars.parking.get(&(station, t)) {
                            occupancy.add_term(*a, 1.0);
                        }
                    }
                    builder.le(occupancy, 1.0);
                }
            }
        }

        for layer in &layers {
            layer.add_balance(&mut builder, network);
        }
        builder.set_objective(ObjectiveSense::Minimise, objective);
        let model = builder.build()?;
        debug!(
            scenario = %scenario.id,
            steps = horizon_len,
            units = units.len(),
            vars = model.num_vars(),
            constraints = model.num_constraints(),
            "mess model built"
        );

        let solution = match ctx.solve(&model)? {
            SolveOutcome::Optimal(solution) => solution,
            SolveOutcome::Infeasible(reason) => return Ok(MessOutcome::Infeasible(reason)),
            SolveOutcome::TimedOut => return Ok(MessOutcome::TimedOut),
        };

        let mut schedule = DispatchSchedule {
            start_step: Some(start),
            ..DispatchSchedule::default()
        };
        for (k, &t) in steps.iter().enumerate() {
            let readout = layers[k].read(&solution, network);
            schedule.max_balance_residual = schedule.max_balance_residual.max(readout.max_balance_residual);
            for bus in network.buses() {
                let served = readout.bus_served.get(&bus.id).copied().unwrap_or(0.0);
                let unserved = (bus.load.value() - served).max(0.0) * dt;
                schedule.unserved_mwh += unserved;
            }
            schedule.served_mw.insert(t, readout.served_mw);
        }
        schedule.weighted_unserved_mwh = scenario.weight * schedule.unserved_mwh;

        for (id, vars) in &units {
            for &t in &steps {
                let mut location = UnitLocation::InTransit;
                let mut power = 0.0;
                for &station in &stations {
                    let key = (station, t);
                    if vars.parking.get(&key).is_some_and(|a| solution.is_one(*a)) {
                        location = UnitLocation::Parked(station);
                    }
                    let d = vars.discharge.get(&key).map_or(0.0, |v| solution.value(*v));
                    let c = vars.charge.get(&key).map_or(0.0, |v| solution.value(*v));
                    power += d - c;
                }
                let soc = vars.soc.get(&t).map_or(0.0, |e| solution.value(*e));
                schedule.entries.push(DispatchEntry {
                    time_step: t,
                    unit: *id,
                    location,
                    power_mw: power,
                    soc_mwh: soc,
                });
            }
        }

        info!(
            scenario = %scenario.id,
            unserved_mwh = schedule.unserved_mwh,
            weighted_unserved_mwh = schedule.weighted_unserved_mwh,
            "mess schedule solved"
        );
        Ok(MessOutcome::Scheduled(schedule))
    }

    /// Steps needed to drive between stations; unknown pairs are unreachable.
    fn travel_steps(&self, from: BusId, to: BusId, horizon: usize) -> usize {
        self.network
            .travel_times
            .steps(from, to)
            .map_or(horizon, |s| s as usize)
    }

    /// Whether a unit parked at `initial` just before the horizon can be
    /// parked at `station` on horizon step `offset`.
    fn reachable_at(&self, initial: BusId, station: BusId, offset: usize) -> bool {
        if initial == station {
            return true;
        }
        match self.network.travel_times.steps(initial, station) {
            Some(tau) => offset >= tau as usize,
            None => false,
        }
    }

    fn add_travel(&self, builder: &mut ModelBuilder, vars: &UnitVars, stations: &[BusId], steps: &[usize]) {
        let horizon = steps.len();
        for &from in stations {
            for &to in stations {
                if from == to {
                    continue;
                }
                let tau = self.travel_steps(from, to, horizon);
                for &t in steps {
                    let Some(&a_from) = vars.parking.get(&(from, t)) else {
                        continue;
                    };
                    // τ·a[from,t] + Σ a[to,t'] ≤ τ over t' in t+1 ..= t+τ
                    let mut row = LinExpr::new().term(a_from, tau as f64);
                    for later in (t + 1)..=(t + tau) {
                        if let Some(&a_to) = vars.parking.get(&(to, later)) {
                            row.add_term(a_to, 1.0);
                        }
                    }
                    if row.terms.len() > 1 {
                        builder.le(row, tau as f64);
                    }
                }
            }
        }
    }
}

/// Stations occupied per step, for checking exclusivity.
pub fn occupancy(schedule: &DispatchSchedule) -> BTreeMap<(usize, BusId), BTreeSet<MessId>> {
    let mut occupied: BTreeMap<(usize, BusId), BTreeSet<MessId>> = BTreeMap::new();
    for entry in &schedule.entries {
        if let UnitLocation::Parked(bus) = entry.location {
            occupied.entry((entry.time_step, bus)).or_default().insert(entry.unit);
        }
    }
    occupied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PhaseConfig, ReconfigConfig};
    use crate::lp::GoodLpBackend;
    use crate::phase::PhaseClassifier;
    use crate::reconfig::RollingReconfigurator;
    use crate::test_utils::{five_bus_radial, five_bus_scenario, hybrid_feeder, radial_without_backup};
    use dnr_core::{BranchId, Component, MessUnit};
    use std::time::Duration;

    fn run(network: &Network, scenario: &Scenario, config: &MessConfig) -> DispatchSchedule {
        let backend = GoodLpBackend::default();
        let ctx = SolveContext::new(&backend, Duration::from_secs(60), Duration::from_secs(120));
        let timeline = PhaseClassifier::new(PhaseConfig::default()).classify(scenario);
        let reconfig = ReconfigConfig::default();
        let plan = RollingReconfigurator::new(network, &reconfig)
            .plan(scenario, &timeline, &ctx)
            .unwrap();
        match MessScheduler::new(network, config).schedule(scenario, &plan, &ctx).unwrap() {
            MessOutcome::Scheduled(schedule) => schedule,
            other => panic!("scheduling failed: {other:?}"),
        }
    }

    fn stranded_scenario() -> Scenario {
        Scenario::new("stranded", 1.0, 6).with_outage(Component::Branch(BranchId::new(2)), 2..=5)
    }

    fn assert_physical(network: &Network, schedule: &DispatchSchedule) {
        assert!(schedule.max_balance_residual < 1e-6);
        for unit in &network.mess_units {
            let mut last_parked: Option<(usize, BusId)> = None;
            for entry in schedule.entries_for(unit.id) {
                assert!(entry.soc_mwh >= unit.soc_min.value() - 1e-6);
                assert!(entry.soc_mwh <= unit.energy_capacity.value() + 1e-6);
                match entry.location {
                    UnitLocation::InTransit => assert!(entry.power_mw.abs() < 1e-6),
                    UnitLocation::Parked(bus) => {
                        if let Some((t0, b0)) = last_parked.filter(|(_, b0)| *b0 != bus) {
                            let tau = network.travel_times.steps(b0, bus).unwrap() as usize;
                            assert!(entry.time_step - t0 > tau, "moved faster than travel time");
                        }
                        last_parked = Some((entry.time_step, bus));
                    }
                }
            }
        }
    }

    #[test]
    fn no_fault_gives_empty_schedule() {
        let network = five_bus_radial();
        let scenario = Scenario::new("calm", 1.0, 4);
        let schedule = run(&network, &scenario, &MessConfig::default());
        assert_eq!(schedule, DispatchSchedule::default());
    }

    #[test]
    fn dg_island_serves_everything() {
        let network = five_bus_radial();
        let schedule = run(&network, &five_bus_scenario(), &MessConfig::default());
        assert_eq!(schedule.start_step, Some(3));
        assert!(schedule.entries.is_empty());
        assert!(schedule.unserved_mwh.abs() < 1e-6);
        assert_eq!(schedule.served_mw.len(), 5);
    }

    #[test]
    fn storage_discharges_into_stranded_island() {
        let network = radial_without_backup();
        let scenario = stranded_scenario();
        let schedule = run(&network, &scenario, &MessConfig::default());
        // Buses 3-5 carry 1.4 MW over four steps; the unit delivers 1 MWh · 0.95.
        assert!((schedule.unserved_mwh - (5.6 - 0.95)).abs() < 1e-5, "{}", schedule.unserved_mwh);
        assert!((schedule.weighted_unserved_mwh - schedule.unserved_mwh).abs() < 1e-9);
        let delivered: f64 = schedule.entries.iter().map(|e| e.power_mw.max(0.0)).sum();
        assert!((delivered - 0.95).abs() < 1e-5);
        assert_physical(&network, &schedule);
    }

    #[test]
    fn without_storage_island_is_unserved() {
        let mut network = radial_without_backup();
        network.mess_units.clear();
        let schedule = run(&network, &stranded_scenario(), &MessConfig::default());
        assert!((schedule.unserved_mwh - 5.6).abs() < 1e-6);
    }

    #[test]
    fn step_hours_scale_energy() {
        let mut network = radial_without_backup();
        network.mess_units.clear();
        let config = MessConfig {
            step_hours: 0.5,
            ..MessConfig::default()
        };
        let schedule = run(&network, &stranded_scenario(), &config);
        assert!((schedule.unserved_mwh - 2.8).abs() < 1e-6);
    }

    #[test]
    fn hybrid_schedule_respects_travel_and_soc() {
        let network = hybrid_feeder();
        let scenario =
            Scenario::new("hybrid", 0.25, 6).with_outage(Component::Branch(BranchId::new(1)), 1..=5);
        let schedule = run(&network, &scenario, &MessConfig::default());
        assert_physical(&network, &schedule);
        assert!((schedule.weighted_unserved_mwh - 0.25 * schedule.unserved_mwh).abs() < 1e-9);

        let mut bare = network.clone();
        bare.mess_units.clear();
        let baseline = run(&bare, &scenario, &MessConfig::default());
        assert!(schedule.unserved_mwh < baseline.unserved_mwh - 0.5);
    }

    #[test]
    fn exclusive_stations_hold_one_unit() {
        let mut network = radial_without_backup();
        network
            .add_mess_unit(MessUnit::new(MessId::new(2), BusId::new(4), 1.0, 0.5))
            .unwrap();
        let config = MessConfig {
            exclusive_stations: true,
            ..MessConfig::default()
        };
        let schedule = run(&network, &stranded_scenario(), &config);
        assert!(occupancy(&schedule).values().all(|units| units.len() <= 1));
        assert_physical(&network, &schedule);
    }
}
