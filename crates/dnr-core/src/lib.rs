//! # dnr-core: AC/DC Hybrid Distribution Network Model
//!
//! Static description of the network every resilience stage reads: buses in
//! the AC or DC domain, switchable branches and interlink converters,
//! distributed resources (DGs and microgrids), and the mobile energy storage
//! (MESS) fleet with its travel-time matrix.
//!
//! ## Design
//!
//! The electrical network is an undirected petgraph multigraph whose nodes are
//! [`Bus`]es and whose edges are [`Branch`]es. Resources and MESS units are kept
//! beside the graph because they attach to exactly one bus and never carry
//! flow themselves. Element ids are newtypes so a bus id can't be passed where
//! a branch id is expected.
//!
//! The model is built once per run, validated, and then shared read-only
//! (`Arc<Network>`) by every scenario task. Switch positions are *not* part of
//! the model: they live in [`topology::SwitchConfig`] snapshots owned by the
//! stage that produced them.
//!
//! ```
//! use dnr_core::*;
//!
//! let mut network = Network::new();
//! network
//!     .add_bus(Bus::new(BusId::new(1), "sub", Domain::Ac).with_generation(0.0, 10.0))
//!     .unwrap();
//! network
//!     .add_bus(Bus::new(BusId::new(2), "feeder", Domain::Ac).with_load(2.0))
//!     .unwrap();
//! network
//!     .add_branch(Branch::new(BranchId::new(1), "1-2", BusId::new(1), BusId::new(2)).with_capacity(5.0))
//!     .unwrap();
//! assert!(network.validate().is_ok());
//! ```

use petgraph::graph::EdgeIndex;
use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod topology;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{DnrError, DnrResult};
pub use petgraph::graph::NodeIndex;
pub use topology::{Component, SwitchConfig, SwitchState};
pub use units::{Hours, MegawattHours, Megawatts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl BranchId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BranchId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl ResourceId {
    #[inline]
    pub fn new(value: usize) -> Self {
        ResourceId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl MessId {
    #[inline]
    pub fn new(value: usize) -> Self {
        MessId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bus {}", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Branch {}", self.0)
    }
}

impl fmt::Display for MessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MESS {}", self.0)
    }
}

/// Electrical domain of a bus. AC and DC sections only meet at converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Ac,
    Dc,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Ac => "ac",
            Domain::Dc => "dc",
        }
    }
}

impl FromStr for Domain {
    type Err = DnrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ac" => Ok(Domain::Ac),
            "dc" => Ok(Domain::Dc),
            other => Err(DnrError::Parse(format!(
                "unknown bus domain '{other}'; expected ac or dc"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub domain: Domain,
    /// Active demand at the bus
    pub load: Megawatts,
    /// Priority applied to unserved load at this bus (1.0 = ordinary)
    pub load_weight: f64,
    /// Lower bound of substation/grid supply at the bus
    pub gen_min: Megawatts,
    /// Upper bound of substation/grid supply; a positive value marks a substation
    pub gen_max: Megawatts,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            domain: Domain::Ac,
            load: Megawatts(0.0),
            load_weight: 1.0,
            gen_min: Megawatts(0.0),
            gen_max: Megawatts(0.0),
        }
    }
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>, domain: Domain) -> Self {
        Self {
            id,
            name: name.into(),
            domain,
            ..Self::default()
        }
    }

    pub fn with_load(mut self, load_mw: f64) -> Self {
        self.load = Megawatts(load_mw);
        self
    }

    pub fn with_load_weight(mut self, weight: f64) -> Self {
        self.load_weight = weight;
        self
    }

    pub fn with_generation(mut self, min_mw: f64, max_mw: f64) -> Self {
        self.gen_min = Megawatts(min_mw);
        self.gen_max = Megawatts(max_mw);
        self
    }

    /// Substations root their own radial sub-tree.
    pub fn is_substation(&self) -> bool {
        self.gen_max.value() > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    #[default]
    Line,
    /// Interlink converter between an AC and a DC bus
    Converter,
}

impl BranchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchKind::Line => "line",
            BranchKind::Converter => "converter",
        }
    }
}

impl FromStr for BranchKind {
    type Err = DnrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "line" => Ok(BranchKind::Line),
            "converter" | "vsc" | "interlink" => Ok(BranchKind::Converter),
            other => Err(DnrError::Parse(format!(
                "unknown branch kind '{other}'; expected line or converter"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    pub kind: BranchKind,
    /// Series resistance (per-unit)
    pub resistance: f64,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Thermal or converter rating; infinite when unrated
    pub capacity: Megawatts,
    /// Whether a remotely operated switch sits on the branch
    pub switchable: bool,
    /// Tie switch: open in the normal configuration
    pub normally_open: bool,
    /// Transfer efficiency; only converters use values below 1
    pub efficiency: f64,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            kind: BranchKind::Line,
            resistance: 0.0,
            reactance: 0.0,
            capacity: Megawatts(f64::INFINITY),
            switchable: false,
            normally_open: false,
            efficiency: 1.0,
        }
    }
}

impl Branch {
    pub fn new(id: BranchId, name: impl Into<String>, from_bus: BusId, to_bus: BusId) -> Self {
        Self {
            id,
            name: name.into(),
            from_bus,
            to_bus,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity_mw: f64) -> Self {
        self.capacity = Megawatts(capacity_mw);
        self
    }

    pub fn with_impedance(mut self, resistance: f64, reactance: f64) -> Self {
        self.resistance = resistance;
        self.reactance = reactance;
        self
    }

    pub fn switchable(mut self) -> Self {
        self.switchable = true;
        self
    }

    /// Normally-open, switchable tie.
    pub fn tie(mut self) -> Self {
        self.switchable = true;
        self.normally_open = true;
        self
    }

    pub fn converter(mut self, efficiency: f64) -> Self {
        self.kind = BranchKind::Converter;
        self.efficiency = efficiency;
        self
    }

    pub fn is_tie(&self) -> bool {
        self.switchable && self.normally_open
    }

    pub fn is_converter(&self) -> bool {
        self.kind == BranchKind::Converter
    }

    pub fn touches(&self, bus: BusId) -> bool {
        self.from_bus == bus || self.to_bus == bus
    }

    pub fn other_end(&self, bus: BusId) -> BusId {
        if self.from_bus == bus {
            self.to_bus
        } else {
            self.from_bus
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Dg,
    Microgrid,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Dg => "dg",
            ResourceKind::Microgrid => "microgrid",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = DnrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dg" => Ok(ResourceKind::Dg),
            "mg" | "microgrid" => Ok(ResourceKind::Microgrid),
            other => Err(DnrError::Parse(format!(
                "unknown resource kind '{other}'; expected dg or microgrid"
            ))),
        }
    }
}

/// DG or microgrid attached to a single bus.
///
/// A microgrid may carry a negative `p_min`, meaning it can import from the
/// network up to that amount (its interchange limit).
#[derive(Debug, Clone)]
pub struct DistributedResource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
    pub bus: BusId,
    pub p_min: Megawatts,
    pub p_max: Megawatts,
}

impl DistributedResource {
    pub fn dg(id: ResourceId, bus: BusId, p_max_mw: f64) -> Self {
        Self {
            id,
            name: format!("DG {}", id.value()),
            kind: ResourceKind::Dg,
            bus,
            p_min: Megawatts(0.0),
            p_max: Megawatts(p_max_mw),
        }
    }

    pub fn microgrid(id: ResourceId, bus: BusId, import_mw: f64, export_mw: f64) -> Self {
        Self {
            id,
            name: format!("MG {}", id.value()),
            kind: ResourceKind::Microgrid,
            bus,
            p_min: Megawatts(-import_mw),
            p_max: Megawatts(export_mw),
        }
    }
}

/// Mobile energy storage unit.
#[derive(Debug, Clone)]
pub struct MessUnit {
    pub id: MessId,
    pub name: String,
    pub energy_capacity: MegawattHours,
    pub power_max: Megawatts,
    pub soc_min: MegawattHours,
    pub initial_soc: MegawattHours,
    pub initial_bus: BusId,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
}

impl MessUnit {
    pub fn new(id: MessId, initial_bus: BusId, energy_mwh: f64, power_mw: f64) -> Self {
        Self {
            id,
            name: format!("MESS {}", id.value()),
            energy_capacity: MegawattHours(energy_mwh),
            power_max: Megawatts(power_mw),
            soc_min: MegawattHours(0.0),
            initial_soc: MegawattHours(energy_mwh),
            initial_bus,
            charge_efficiency: 0.95,
            discharge_efficiency: 0.95,
        }
    }

    pub fn with_soc(mut self, soc_min_mwh: f64, initial_soc_mwh: f64) -> Self {
        self.soc_min = MegawattHours(soc_min_mwh);
        self.initial_soc = MegawattHours(initial_soc_mwh);
        self
    }

    pub fn with_efficiency(mut self, charge: f64, discharge: f64) -> Self {
        self.charge_efficiency = charge;
        self.discharge_efficiency = discharge;
        self
    }
}

/// Road travel times between MESS stations, in whole time steps.
#[derive(Debug, Clone, Default)]
pub struct TravelTimes {
    steps: BTreeMap<(BusId, BusId), u32>,
}

impl TravelTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, from: BusId, to: BusId, steps: u32) {
        self.steps.insert((from, to), steps);
    }

    /// Insert the same travel time in both directions.
    pub fn set_symmetric(&mut self, a: BusId, b: BusId, steps: u32) {
        self.set(a, b, steps);
        self.set(b, a, steps);
    }

    /// Travel time from `from` to `to`; `None` when the pair is not connected by road.
    pub fn steps(&self, from: BusId, to: BusId) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        self.steps.get(&(from, to)).copied()
    }

    pub fn stations(&self) -> BTreeSet<BusId> {
        self.steps
            .keys()
            .flat_map(|(from, to)| [*from, *to])
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (BusId, BusId, u32)> + '_ {
        self.steps.iter().map(|(&(from, to), &steps)| (from, to, steps))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// The AC/DC hybrid network shared read-only by every scenario task.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub graph: Graph<Bus, Branch, Undirected>,
    bus_lookup: HashMap<BusId, NodeIndex>,
    branch_lookup: HashMap<BranchId, EdgeIndex>,
    pub resources: Vec<DistributedResource>,
    pub mess_units: Vec<MessUnit>,
    pub travel_times: TravelTimes,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
            ..Self::default()
        }
    }

    pub fn add_bus(&mut self, bus: Bus) -> DnrResult<NodeIndex> {
        if self.bus_lookup.contains_key(&bus.id) {
            return Err(DnrError::malformed(format!("duplicate {}", bus.id)));
        }
        let id = bus.id;
        let idx = self.graph.add_node(bus);
        self.bus_lookup.insert(id, idx);
        Ok(idx)
    }

    pub fn add_branch(&mut self, branch: Branch) -> DnrResult<EdgeIndex> {
        if self.branch_lookup.contains_key(&branch.id) {
            return Err(DnrError::malformed(format!("duplicate {}", branch.id)));
        }
        if branch.from_bus == branch.to_bus {
            return Err(DnrError::malformed(format!(
                "{} connects {} to itself",
                branch.id, branch.from_bus
            )));
        }
        let from = self.node_index(branch.from_bus).ok_or_else(|| {
            DnrError::malformed(format!(
                "{} references unknown {}",
                branch.id, branch.from_bus
            ))
        })?;
        let to = self.node_index(branch.to_bus).ok_or_else(|| {
            DnrError::malformed(format!("{} references unknown {}", branch.id, branch.to_bus))
        })?;
        let id = branch.id;
        let idx = self.graph.add_edge(from, to, branch);
        self.branch_lookup.insert(id, idx);
        Ok(idx)
    }

    pub fn add_resource(&mut self, resource: DistributedResource) -> DnrResult<()> {
        if !self.bus_lookup.contains_key(&resource.bus) {
            return Err(DnrError::malformed(format!(
                "resource {} references unknown {}",
                resource.id.value(),
                resource.bus
            )));
        }
        if self.resources.iter().any(|r| r.id == resource.id) {
            return Err(DnrError::malformed(format!(
                "duplicate resource {}",
                resource.id.value()
            )));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn add_mess_unit(&mut self, unit: MessUnit) -> DnrResult<()> {
        if !self.bus_lookup.contains_key(&unit.initial_bus) {
            return Err(DnrError::malformed(format!(
                "{} starts at unknown {}",
                unit.id, unit.initial_bus
            )));
        }
        if self.mess_units.iter().any(|u| u.id == unit.id) {
            return Err(DnrError::malformed(format!("duplicate {}", unit.id)));
        }
        self.mess_units.push(unit);
        Ok(())
    }

    pub fn node_index(&self, id: BusId) -> Option<NodeIndex> {
        self.bus_lookup.get(&id).copied()
    }

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.node_index(id).map(|idx| &self.graph[idx])
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branch_lookup.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.graph.node_weights()
    }

    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.graph.edge_weights()
    }

    /// Bus ids in ascending order.
    pub fn bus_ids(&self) -> Vec<BusId> {
        let mut ids: Vec<BusId> = self.buses().map(|b| b.id).collect();
        ids.sort();
        ids
    }

    /// Branch ids in ascending order.
    pub fn branch_ids(&self) -> Vec<BranchId> {
        let mut ids: Vec<BranchId> = self.branches().map(|b| b.id).collect();
        ids.sort();
        ids
    }

    pub fn incident_branches(&self, bus: BusId) -> Vec<&Branch> {
        match self.node_index(bus) {
            Some(idx) => self.graph.edges(idx).map(|edge| edge.weight()).collect(),
            None => Vec::new(),
        }
    }

    pub fn resources_at(&self, bus: BusId) -> impl Iterator<Item = &DistributedResource> {
        self.resources.iter().filter(move |r| r.bus == bus)
    }

    /// Maximum injection available at a bus from its substation and resources.
    pub fn supply_max(&self, bus: BusId) -> Megawatts {
        let substation = self.bus(bus).map(|b| b.gen_max).unwrap_or_default();
        let resources: Megawatts = self.resources_at(bus).map(|r| r.p_max.max(Megawatts(0.0))).sum();
        substation.max(Megawatts(0.0)) + resources
    }

    pub fn is_source(&self, bus: BusId) -> bool {
        self.supply_max(bus).value() > 0.0
    }

    pub fn source_buses(&self) -> BTreeSet<BusId> {
        self.buses()
            .map(|b| b.id)
            .filter(|id| self.is_source(*id))
            .collect()
    }

    pub fn total_load(&self) -> Megawatts {
        self.buses().map(|b| b.load).sum()
    }

    /// Candidate parking locations for MESS units.
    pub fn mess_stations(&self) -> BTreeSet<BusId> {
        let mut stations = self.travel_times.stations();
        stations.extend(self.mess_units.iter().map(|u| u.initial_bus));
        stations
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for bus in self.buses() {
            stats.num_buses += 1;
            if bus.domain == Domain::Dc {
                stats.num_dc_buses += 1;
            }
            stats.total_load_mw += bus.load.value();
            stats.total_supply_mw += bus.gen_max.value().max(0.0);
        }
        for branch in self.branches() {
            stats.num_branches += 1;
            if branch.is_converter() {
                stats.num_converters += 1;
            }
            if branch.switchable {
                stats.num_switches += 1;
            }
            if branch.is_tie() {
                stats.num_ties += 1;
            }
        }
        stats.num_resources = self.resources.len();
        stats.total_supply_mw += self
            .resources
            .iter()
            .map(|r| r.p_max.value().max(0.0))
            .sum::<f64>();
        stats.num_mess_units = self.mess_units.len();
        stats
    }

    /// Validate structural and parameter consistency into `diag`.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.graph.node_count() == 0 {
            diag.add_error("structure", "network has no buses");
            return;
        }

        for bus in self.buses() {
            let entity = bus.id.to_string();
            if !bus.load.is_finite() || bus.load.value() < 0.0 {
                diag.add_error_with_entity("parameter", "load must be finite and non-negative", &entity);
            }
            if bus.load_weight < 0.0 {
                diag.add_error_with_entity("parameter", "load weight must be non-negative", &entity);
            }
            if bus.gen_min.value() > bus.gen_max.value() {
                diag.add_error_with_entity("parameter", "gen_min exceeds gen_max", &entity);
            }
        }

        for branch in self.branches() {
            let entity = branch.id.to_string();
            if branch.capacity.value().is_nan() || branch.capacity.value() < 0.0 {
                diag.add_error_with_entity("parameter", "capacity must be non-negative", &entity);
            }
            if !(branch.efficiency > 0.0 && branch.efficiency <= 1.0) {
                diag.add_error_with_entity("parameter", "efficiency must lie in (0, 1]", &entity);
            }
            if branch.normally_open && !branch.switchable {
                diag.add_error_with_entity(
                    "topology",
                    "normally-open branch must be switchable",
                    &entity,
                );
            }
            let (Some(from), Some(to)) = (self.bus(branch.from_bus), self.bus(branch.to_bus)) else {
                diag.add_error_with_entity("reference", "branch endpoint missing", &entity);
                continue;
            };
            match branch.kind {
                BranchKind::Converter if from.domain == to.domain => diag.add_error_with_entity(
                    "topology",
                    "converter must join an AC bus to a DC bus",
                    &entity,
                ),
                BranchKind::Line if from.domain != to.domain => diag.add_error_with_entity(
                    "topology",
                    "line crosses the AC/DC boundary without a converter",
                    &entity,
                ),
                _ => {}
            }
        }

        for resource in &self.resources {
            let entity = format!("Resource {}", resource.id.value());
            if resource.p_min.value() > resource.p_max.value() {
                diag.add_error_with_entity("parameter", "p_min exceeds p_max", &entity);
            }
            if resource.kind == ResourceKind::Dg && resource.p_min.value() < 0.0 {
                diag.add_error_with_entity("parameter", "DG cannot absorb power", &entity);
            }
        }

        if self.source_buses().is_empty() {
            diag.add_error("structure", "network has no substation, DG or microgrid source");
        }

        let normal = SwitchConfig::normal(self);
        let all: BTreeSet<BusId> = self.buses().map(|b| b.id).collect();
        let report = graph_utils::radiality(self, &normal, &all);
        if !report.is_radial() {
            diag.add_warning(
                "topology",
                &format!(
                    "normal configuration is not a sourced radial forest ({} closed branches, {} buses, {} sourced sub-trees, {} unsourced components)",
                    report.closed_branches,
                    report.buses,
                    report.sourced_subtrees,
                    report.unsourced_components
                ),
            );
        }

        for unit in &self.mess_units {
            let entity = unit.id.to_string();
            if unit.energy_capacity.value() <= 0.0 {
                diag.add_error_with_entity("mess", "energy capacity must be positive", &entity);
            }
            if unit.power_max.value() < 0.0 {
                diag.add_error_with_entity("mess", "power bound must be non-negative", &entity);
            }
            if unit.soc_min.value() < 0.0
                || unit.soc_min.value() > unit.initial_soc.value()
                || unit.initial_soc.value() > unit.energy_capacity.value()
            {
                diag.add_error_with_entity(
                    "mess",
                    "require 0 <= soc_min <= initial_soc <= energy_capacity",
                    &entity,
                );
            }
            for eff in [unit.charge_efficiency, unit.discharge_efficiency] {
                if !(eff > 0.0 && eff <= 1.0) {
                    diag.add_error_with_entity("mess", "efficiency must lie in (0, 1]", &entity);
                }
            }
        }

        for (from, to, steps) in self.travel_times.entries() {
            let entity = format!("travel {}->{}", from.value(), to.value());
            if self.bus(from).is_none() || self.bus(to).is_none() {
                diag.add_error_with_entity("reference", "travel time references unknown bus", &entity);
            }
            if from != to && steps == 0 {
                diag.add_error_with_entity(
                    "mess",
                    "travel between distinct stations takes at least one step",
                    &entity,
                );
            }
        }
    }

    /// Validate and fail with MalformedInput on any error.
    pub fn validate(&self) -> DnrResult<()> {
        let mut diag = Diagnostics::new();
        self.validate_into(&mut diag);
        diag.into_result()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_dc_buses: usize,
    pub num_branches: usize,
    pub num_converters: usize,
    pub num_switches: usize,
    pub num_ties: usize,
    pub num_resources: usize,
    pub num_mess_units: usize,
    pub total_load_mw: f64,
    pub total_supply_mw: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder() -> Network {
        let mut network = Network::new();
        network
            .add_bus(Bus::new(BusId::new(1), "sub", Domain::Ac).with_generation(0.0, 10.0))
            .unwrap();
        network
            .add_bus(Bus::new(BusId::new(2), "ac load", Domain::Ac).with_load(1.0))
            .unwrap();
        network
            .add_bus(Bus::new(BusId::new(3), "dc load", Domain::Dc).with_load(0.5))
            .unwrap();
        network
            .add_branch(Branch::new(BranchId::new(1), "1-2", BusId::new(1), BusId::new(2)).with_capacity(5.0))
            .unwrap();
        network
            .add_branch(
                Branch::new(BranchId::new(2), "vsc", BusId::new(2), BusId::new(3))
                    .with_capacity(2.0)
                    .converter(0.97)
                    .switchable(),
            )
            .unwrap();
        network
    }

    #[test]
    fn valid_hybrid_feeder_passes() {
        let network = feeder();
        assert!(network.validate().is_ok());
        let stats = network.stats();
        assert_eq!(stats.num_buses, 3);
        assert_eq!(stats.num_dc_buses, 1);
        assert_eq!(stats.num_converters, 1);
        assert_eq!(stats.num_switches, 1);
        assert!((stats.total_load_mw - 1.5).abs() < 1e-12);
    }

    #[test]
    fn cloned_network_keeps_lookups() {
        let network = feeder();
        let mut copy = network.clone();
        copy.add_bus(Bus::new(BusId::new(4), "extra", Domain::Ac)).unwrap();
        assert_eq!(network.bus_ids().len(), 3);
        assert_eq!(copy.bus_ids().len(), 4);
        assert_eq!(copy.branch(BranchId::new(2)).map(|b| b.to_bus), Some(BusId::new(3)));
        assert!(copy.bus(BusId::new(1)).is_some_and(|b| b.is_substation()));
    }

    #[test]
    fn branch_to_unknown_bus_is_rejected() {
        let mut network = feeder();
        let err = network
            .add_branch(Branch::new(BranchId::new(9), "bad", BusId::new(1), BusId::new(42)))
            .unwrap_err();
        assert_eq!(err.kind(), "MALFORMED_INPUT");
    }

    #[test]
    fn line_across_domains_is_an_error() {
        let mut network = feeder();
        network
            .add_branch(Branch::new(BranchId::new(3), "bad", BusId::new(1), BusId::new(3)))
            .unwrap();
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag
            .errors()
            .any(|issue| issue.message.contains("AC/DC boundary")));
    }

    #[test]
    fn supply_includes_resources() {
        let mut network = feeder();
        network
            .add_resource(DistributedResource::dg(ResourceId::new(1), BusId::new(2), 0.8))
            .unwrap();
        network
            .add_resource(DistributedResource::microgrid(ResourceId::new(2), BusId::new(3), 0.2, 0.3))
            .unwrap();
        assert!((network.supply_max(BusId::new(2)).value() - 0.8).abs() < 1e-12);
        assert!((network.supply_max(BusId::new(3)).value() - 0.3).abs() < 1e-12);
        assert_eq!(network.source_buses().len(), 3);
    }

    #[test]
    fn mess_soc_bounds_are_checked() {
        let mut network = feeder();
        network
            .add_mess_unit(MessUnit::new(MessId::new(1), BusId::new(2), 1.0, 0.5).with_soc(0.0, 2.0))
            .unwrap();
        let err = network.validate().unwrap_err();
        assert!(err.to_string().contains("soc_min"));
    }

    #[test]
    fn zero_travel_time_between_stations_is_rejected() {
        let mut network = feeder();
        network.travel_times.set_symmetric(BusId::new(1), BusId::new(2), 0);
        assert!(network.validate().is_err());
        assert_eq!(network.travel_times.steps(BusId::new(1), BusId::new(1)), Some(0));
    }

    #[test]
    fn domain_and_kind_parse() {
        assert_eq!("DC".parse::<Domain>().unwrap(), Domain::Dc);
        assert_eq!("vsc".parse::<BranchKind>().unwrap(), BranchKind::Converter);
        assert_eq!("mg".parse::<ResourceKind>().unwrap(), ResourceKind::Microgrid);
        assert!("hvdc".parse::<Domain>().is_err());
    }
}
