//! Small networks and scenarios shared by unit and integration tests.

use crate::config::OutputFormat;
use crate::io::{artifact_path, ArtifactTable};
use anyhow::{Context, Result};
use dnr_core::{
    Branch, BranchId, Bus, BusId, Component, DistributedResource, Domain, MessId, MessUnit,
    Network, ResourceId,
};
use dnr_scenarios::Scenario;
use polars::prelude::{CsvReader, DataFrame, ParquetReader, SerReader};
use std::{fs::File, path::Path};

fn chain(with_dg: bool) -> Network {
    let mut network = Network::new();
    let buses = [
        Bus::new(BusId::new(1), "substation", Domain::Ac).with_generation(0.0, 10.0),
        Bus::new(BusId::new(2), "b2", Domain::Ac).with_load(1.0),
        Bus::new(BusId::new(3), "b3", Domain::Ac).with_load(0.5),
        Bus::new(BusId::new(4), "b4", Domain::Ac).with_load(0.5),
        Bus::new(BusId::new(5), "b5", Domain::Ac).with_load(0.4),
    ];
    for bus in buses {
        network.add_bus(bus).expect("fixture bus");
    }
    for (id, from, to) in [(1, 1, 2), (2, 2, 3), (3, 3, 4), (4, 4, 5)] {
        network
            .add_branch(
                Branch::new(BranchId::new(id), format!("{from}-{to}"), BusId::new(from), BusId::new(to))
                    .with_capacity(5.0)
                    .with_impedance(0.01, 0.02)
                    .switchable(),
            )
            .expect("fixture branch");
    }
    if with_dg {
        network
            .add_resource(DistributedResource::dg(ResourceId::new(1), BusId::new(5), 1.5))
            .expect("fixture dg");
    }
    network
}

/// Substation at bus 1 feeding the switchable chain 1-2-3-4-5 (branches 1..=4),
/// with a 1.5 MW DG at the far end. Total load 2.4 MW.
pub fn five_bus_radial() -> Network {
    chain(true)
}

/// [`five_bus_radial`] without the DG, plus one mobile storage unit (1 MWh,
/// 0.5 MW) parked at bus 4. A second station at bus 2 is two steps away.
pub fn radial_without_backup() -> Network {
    let mut network = chain(false);
    network
        .add_mess_unit(MessUnit::new(MessId::new(1), BusId::new(4), 1.0, 0.5))
        .expect("fixture mess");
    network
        .travel_times
        .set_symmetric(BusId::new(2), BusId::new(4), 2);
    network
}

/// Branch 2 (2-3) fails at step 3, stays out at step 4 and is repaired at step 5.
pub fn five_bus_scenario() -> Scenario {
    Scenario::new("s1", 1.0, 8).with_outage(Component::Branch(BranchId::new(2)), 3..=4)
}

/// AC/DC feeder:
///
/// ```text
///  AC: 1(sub) --b1-- 2 --b2(fixed)-- 3
///                    |               :
///                 b3 (VSC)        b5 (VSC tie, open)
///                    |               :
///  DC:               4 -----b4------ 5 (microgrid)
/// ```
///
/// One MESS unit (2 MWh, 0.5 MW) starts at bus 3; stations 3 and 5 are one
/// step apart.
pub fn hybrid_feeder() -> Network {
    let mut network = Network::new();
    let buses = [
        Bus::new(BusId::new(1), "ac sub", Domain::Ac).with_generation(0.0, 10.0),
        Bus::new(BusId::new(2), "ac2", Domain::Ac).with_load(1.0),
        Bus::new(BusId::new(3), "ac3", Domain::Ac).with_load(0.5).with_load_weight(2.0),
        Bus::new(BusId::new(4), "dc4", Domain::Dc).with_load(0.6),
        Bus::new(BusId::new(5), "dc5", Domain::Dc).with_load(0.4),
    ];
    for bus in buses {
        network.add_bus(bus).expect("fixture bus");
    }
    let branches = [
        Branch::new(BranchId::new(1), "1-2", BusId::new(1), BusId::new(2))
            .with_capacity(5.0)
            .switchable(),
        Branch::new(BranchId::new(2), "2-3", BusId::new(2), BusId::new(3)).with_capacity(5.0),
        Branch::new(BranchId::new(3), "vsc 2-4", BusId::new(2), BusId::new(4))
            .with_capacity(3.0)
            .converter(0.95)
            .switchable(),
        Branch::new(BranchId::new(4), "dc 4-5", BusId::new(4), BusId::new(5))
            .with_capacity(2.0)
            .switchable(),
        Branch::new(BranchId::new(5), "vsc tie 3-5", BusId::new(3), BusId::new(5))
            .with_capacity(2.0)
            .converter(0.95)
            .tie(),
    ];
    for branch in branches {
        network.add_branch(branch).expect("fixture branch");
    }
    network
        .add_resource(DistributedResource::microgrid(
            ResourceId::new(1),
            BusId::new(5),
            0.2,
            0.5,
        ))
        .expect("fixture microgrid");
    network
        .add_mess_unit(MessUnit::new(MessId::new(1), BusId::new(3), 2.0, 0.5))
        .expect("fixture mess");
    network
        .travel_times
        .set_symmetric(BusId::new(3), BusId::new(5), 1);
    network
}

/// Read back one artifact table written by [`crate::io::ArtifactWriter`].
pub fn read_artifact(dir: &Path, table: ArtifactTable, format: OutputFormat) -> Result<DataFrame> {
    let path = artifact_path(dir, table, format);
    let mut file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    match format {
        OutputFormat::Parquet => ParquetReader::new(&mut file)
            .finish()
            .context("reading parquet artifact"),
        OutputFormat::Csv => CsvReader::new(&mut file)
            .has_header(true)
            .finish()
            .context("reading csv artifact"),
    }
}
