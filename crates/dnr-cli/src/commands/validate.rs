//! `dnr validate`: load inputs and print every diagnostic.

use anyhow::Result;
use dnr_core::{Diagnostics, DnrError};
use std::path::Path;

pub fn handle(network_dir: &Path, scenarios: Option<&Path>) -> Result<()> {
    let network = dnr_io::load_network(network_dir).map_err(|err| {
        DnrError::malformed(format!("network '{}': {err:#}", network_dir.display()))
    })?;
    let mut diag = Diagnostics::new();
    network.validate_into(&mut diag);

    let stats = network.stats();
    println!(
        "Network: {} buses ({} DC), {} branches ({} converters, {} switches, {} ties), {} resources, {} MESS units, {:.3} MW load",
        stats.num_buses,
        stats.num_dc_buses,
        stats.num_branches,
        stats.num_converters,
        stats.num_switches,
        stats.num_ties,
        stats.num_resources,
        stats.num_mess_units,
        stats.total_load_mw
    );

    if let Some(path) = scenarios {
        let store = dnr_io::load_scenarios(path).map_err(|err| {
            DnrError::malformed(format!("scenarios '{}': {err:#}", path.display()))
        })?;
        store.validate_into(&network, &mut diag);
        println!(
            "Scenarios: {} (total weight {:.4})",
            store.len(),
            store.total_weight()
        );
    }

    for issue in &diag.issues {
        println!("{issue}");
    }
    println!(
        "{} error(s), {} warning(s)",
        diag.error_count(),
        diag.warning_count()
    );
    diag.into_result()?;
    Ok(())
}
