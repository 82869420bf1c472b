//! Network directory loader.

use crate::tables::{optional, parse_flag, read_rows, require};
use anyhow::{Context, Result};
use dnr_core::{
    Branch, BranchId, BranchKind, Bus, BusId, DistributedResource, Domain, MessId, MessUnit,
    Megawatts, Network, ResourceId, ResourceKind,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// File names of a network directory, required tables first.
pub const NETWORK_TABLES: [&str; 5] = [
    "buses.csv",
    "branches.csv",
    "resources.csv",
    "mess.csv",
    "travel_times.csv",
];

#[derive(Debug, Deserialize)]
struct BusRecord {
    bus_id: usize,
    name: Option<String>,
    domain: Option<String>,
    load_mw: Option<f64>,
    load_weight: Option<f64>,
    gen_min_mw: Option<f64>,
    gen_max_mw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BranchRecord {
    branch_id: usize,
    name: Option<String>,
    from_bus: usize,
    to_bus: usize,
    kind: Option<String>,
    resistance: Option<f64>,
    reactance: Option<f64>,
    capacity_mw: Option<f64>,
    switchable: Option<String>,
    normally_open: Option<String>,
    efficiency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResourceRecord {
    resource_id: usize,
    name: Option<String>,
    kind: String,
    bus_id: usize,
    p_min_mw: Option<f64>,
    p_max_mw: f64,
}

#[derive(Debug, Deserialize)]
struct MessRecord {
    unit_id: usize,
    name: Option<String>,
    energy_mwh: f64,
    power_mw: f64,
    soc_min_mwh: Option<f64>,
    initial_soc_mwh: Option<f64>,
    initial_bus: usize,
    charge_efficiency: Option<f64>,
    discharge_efficiency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TravelRecord {
    from_bus: usize,
    to_bus: usize,
    steps: u32,
}

/// Load the network tables under `dir`.
///
/// Duplicate ids, dangling references and unparsable cells fail with their
/// table and line. Parameter and topology checks are left to
/// [`Network::validate_into`].
pub fn load_network(dir: &Path) -> Result<Network> {
    let mut network = Network::new();

    let buses = require(dir, "buses.csv")?;
    for (line, record) in read_rows::<BusRecord>(&buses, "buses")? {
        let bus = bus_from_record(record).with_context(|| format!("buses.csv line {line}"))?;
        network
            .add_bus(bus)
            .with_context(|| format!("buses.csv line {line}"))?;
    }

    let branches = require(dir, "branches.csv")?;
    for (line, record) in read_rows::<BranchRecord>(&branches, "branches")? {
        let branch =
            branch_from_record(record).with_context(|| format!("branches.csv line {line}"))?;
        network
            .add_branch(branch)
            .with_context(|| format!("branches.csv line {line}"))?;
    }

    if let Some(path) = optional(dir, "resources.csv") {
        for (line, record) in read_rows::<ResourceRecord>(&path, "resources")? {
            let resource = resource_from_record(record)
                .with_context(|| format!("resources.csv line {line}"))?;
            network
                .add_resource(resource)
                .with_context(|| format!("resources.csv line {line}"))?;
        }
    }

    if let Some(path) = optional(dir, "mess.csv") {
        for (line, record) in read_rows::<MessRecord>(&path, "mess")? {
            network
                .add_mess_unit(mess_from_record(record))
                .with_context(|| format!("mess.csv line {line}"))?;
        }
    }

    if let Some(path) = optional(dir, "travel_times.csv") {
        let mut steps = BTreeMap::new();
        for (_, record) in read_rows::<TravelRecord>(&path, "travel times")? {
            steps.insert((record.from_bus, record.to_bus), record.steps);
        }
        // A pair listed in one direction only is taken as symmetric.
        for (&(from, to), &value) in &steps {
            network.travel_times.set(BusId::new(from), BusId::new(to), value);
            if !steps.contains_key(&(to, from)) {
                network.travel_times.set(BusId::new(to), BusId::new(from), value);
            }
        }
    }

    let stats = network.stats();
    debug!(
        dir = %dir.display(),
        buses = stats.num_buses,
        branches = stats.num_branches,
        mess_units = stats.num_mess_units,
        "network tables loaded"
    );
    Ok(network)
}

fn bus_from_record(record: BusRecord) -> Result<Bus> {
    let domain: Domain = match record.domain.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw.parse()?,
        _ => Domain::Ac,
    };
    let name = record
        .name
        .unwrap_or_else(|| format!("bus {}", record.bus_id));
    Ok(Bus::new(BusId::new(record.bus_id), name, domain)
        .with_load(record.load_mw.unwrap_or(0.0))
        .with_load_weight(record.load_weight.unwrap_or(1.0))
        .with_generation(
            record.gen_min_mw.unwrap_or(0.0),
            record.gen_max_mw.unwrap_or(0.0),
        ))
}

fn branch_from_record(record: BranchRecord) -> Result<Branch> {
    let kind: BranchKind = record.kind.as_deref().unwrap_or("line").parse()?;
    let name = record
        .name
        .unwrap_or_else(|| format!("{}-{}", record.from_bus, record.to_bus));
    let mut branch = Branch::new(
        BranchId::new(record.branch_id),
        name,
        BusId::new(record.from_bus),
        BusId::new(record.to_bus),
    )
    .with_impedance(
        record.resistance.unwrap_or(0.0),
        record.reactance.unwrap_or(0.0),
    );
    if let Some(capacity) = record.capacity_mw {
        branch = branch.with_capacity(capacity);
    }
    if kind == BranchKind::Converter {
        branch = branch.converter(record.efficiency.unwrap_or(1.0));
    }
    branch.switchable = parse_flag(record.switchable.as_deref())?;
    branch.normally_open = parse_flag(record.normally_open.as_deref())?;
    Ok(branch)
}

fn resource_from_record(record: ResourceRecord) -> Result<DistributedResource> {
    let kind: ResourceKind = record.kind.parse()?;
    let id = ResourceId::new(record.resource_id);
    let bus = BusId::new(record.bus_id);
    let mut resource = match kind {
        ResourceKind::Dg => DistributedResource::dg(id, bus, record.p_max_mw),
        ResourceKind::Microgrid => DistributedResource::microgrid(id, bus, 0.0, record.p_max_mw),
    };
    if let Some(p_min) = record.p_min_mw {
        resource.p_min = Megawatts(p_min);
    }
    if let Some(name) = record.name {
        resource.name = name;
    }
    Ok(resource)
}

fn mess_from_record(record: MessRecord) -> MessUnit {
    let mut unit = MessUnit::new(
        MessId::new(record.unit_id),
        BusId::new(record.initial_bus),
        record.energy_mwh,
        record.power_mw,
    )
    .with_soc(
        record.soc_min_mwh.unwrap_or(0.0),
        record.initial_soc_mwh.unwrap_or(record.energy_mwh),
    );
    let charge_efficiency = record.charge_efficiency.unwrap_or(unit.charge_efficiency);
    let discharge_efficiency = record
        .discharge_efficiency
        .unwrap_or(unit.discharge_efficiency);
    unit = unit.with_efficiency(charge_efficiency, discharge_efficiency);
    if let Some(name) = record.name {
        unit.name = name;
    }
    unit
}
