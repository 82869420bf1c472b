//! Scenario state tables and event specs.

use crate::tables::{optional, parse_flag, read_rows, require};
use anyhow::{Context, Result};
use dnr_core::Component;
use dnr_scenarios::{load_spec_from_path, ScenarioHeader, ScenarioStore, StateRecord};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

const STATES_TABLE: &str = "scenario_states.csv";
const WEIGHTS_TABLE: &str = "scenario_weights.csv";

/// File names looked up when scenarios are given as a directory.
pub const SCENARIO_TABLES: [&str; 2] = [STATES_TABLE, WEIGHTS_TABLE];

#[derive(Debug, Deserialize)]
struct StateRow {
    scenario_id: String,
    time_step: u32,
    component: String,
    component_id: usize,
    in_service: String,
}

#[derive(Debug, Deserialize)]
struct WeightRow {
    scenario_id: String,
    weight: Option<f64>,
    horizon: Option<u32>,
}

/// Load scenarios from `path`.
///
/// * a directory holding `scenario_states.csv` (and optionally
///   `scenario_weights.csv`),
/// * a states CSV file, with the weights table looked up beside it,
/// * a `.yaml`, `.yml` or `.json` outage event spec.
pub fn load_scenarios(path: &Path) -> Result<ScenarioStore> {
    let store = if path.is_dir() {
        let states = require(path, STATES_TABLE)?;
        load_scenario_tables(&states, optional(path, WEIGHTS_TABLE).as_deref())?
    } else {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => {
                let weights = path.parent().and_then(|dir| optional(dir, WEIGHTS_TABLE));
                load_scenario_tables(path, weights.as_deref())?
            }
            _ => load_spec_from_path(path)?
                .expand()
                .with_context(|| format!("expanding scenario spec '{}'", path.display()))?,
        }
    };
    info!(
        source = %path.display(),
        scenarios = store.len(),
        total_weight = store.total_weight(),
        "scenarios loaded"
    );
    Ok(store)
}

/// Assemble scenarios from a long state table and an optional weight table.
pub fn load_scenario_tables(states: &Path, weights: Option<&Path>) -> Result<ScenarioStore> {
    let mut records = Vec::new();
    for (line, row) in read_rows::<StateRow>(states, "scenario states")? {
        let component = Component::from_parts(&row.component, row.component_id)
            .with_context(|| format!("{STATES_TABLE} line {line}"))?;
        let in_service = parse_flag(Some(&row.in_service))
            .with_context(|| format!("{STATES_TABLE} line {line}"))?;
        records.push(StateRecord {
            scenario_id: row.scenario_id,
            time_step: row.time_step,
            component,
            in_service,
        });
    }

    let mut headers = Vec::new();
    if let Some(path) = weights {
        for (line, row) in read_rows::<WeightRow>(path, "scenario weights")? {
            let weight = row.weight.unwrap_or(1.0);
            if !(weight.is_finite() && weight >= 0.0) {
                anyhow::bail!("{WEIGHTS_TABLE} line {line}: weight must be finite and non-negative");
            }
            headers.push(ScenarioHeader {
                scenario_id: row.scenario_id,
                weight,
                horizon: row.horizon,
            });
        }
    }

    Ok(ScenarioStore::assemble(&headers, &records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnr_core::{BranchId, BusId};
    use std::fs;
    use tempfile::tempdir;

    const STATES: &str = "scenario_id,time_step,component,component_id,in_service\n\
        s1,0,branch,2,1\n\
        s1,1,branch,2,0\n\
        s1,2,branch,2,0\n\
        s1,3,branch,2,1\n\
        s2,0,bus,4,true\n\
        s2,1,bus,4,false\n";

    #[test]
    fn directory_with_states_and_weights() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(STATES_TABLE), STATES).unwrap();
        fs::write(
            dir.path().join(WEIGHTS_TABLE),
            "scenario_id,weight,horizon\ns2,0.25,4\ns1,0.75,\n",
        )
        .unwrap();

        let store = load_scenarios(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        let ids: Vec<_> = store.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["s2", "s1"]);

        let s1 = store.get("s1").unwrap();
        assert_eq!(s1.horizon(), 4);
        assert!(s1.outages_at(0).unwrap().is_empty());
        assert!(s1
            .outages_at(2)
            .unwrap()
            .contains(&Component::Branch(BranchId::new(2))));

        let s2 = store.get("s2").unwrap();
        assert_eq!(s2.weight, 0.25);
        assert_eq!(s2.horizon(), 4);
        assert!(s2.outages_at(3).unwrap().is_empty());
        assert!(s2
            .outages_at(1)
            .unwrap()
            .contains(&Component::Bus(BusId::new(4))));
    }

    #[test]
    fn states_file_without_weights_defaults_to_unit_weight() {
        let dir = tempdir().unwrap();
        let states = dir.path().join("trajectories.csv");
        fs::write(&states, STATES).unwrap();
        let store = load_scenarios(&states).unwrap();
        assert_eq!(store.total_weight(), 2.0);
        assert_eq!(store.get("s2").unwrap().horizon(), 2);
    }

    #[test]
    fn event_spec_is_expanded() {
        let dir = tempdir().unwrap();
        let spec = dir.path().join("storm.yaml");
        fs::write(
            &spec,
            "defaults:\n  weight: 0.1\n  horizon: 6\nscenarios:\n  - scenario_id: storm\n    events:\n      - { component: branch, id: 3, fail_step: 2, repair_step: 4 }\n",
        )
        .unwrap();
        let store = load_scenarios(&spec).unwrap();
        let storm = store.get("storm").unwrap();
        assert_eq!(storm.horizon(), 6);
        assert!(storm
            .outages_at(3)
            .unwrap()
            .contains(&Component::Branch(BranchId::new(3))));
        assert!(storm.outages_at(4).unwrap().is_empty());
    }

    #[test]
    fn unknown_component_kind_names_the_line() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(STATES_TABLE),
            "scenario_id,time_step,component,component_id,in_service\ns1,0,transformer,1,0\n",
        )
        .unwrap();
        let err = load_scenarios(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn missing_states_table_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_scenarios(dir.path()).is_err());
    }
}
