//! Outage event specs.
//!
//! Instead of a per-step state table, scenarios may be written as a list of
//! outage events in YAML or JSON:
//!
//! ```yaml
//! defaults:
//!   weight: 0.1
//!   horizon: 12
//! scenarios:
//!   - scenario_id: storm-a
//!     events:
//!       - { component: branch, id: 3, fail_step: 3, repair_step: 5 }
//!       - { component: bus, id: 7, fail_step: 4 }
//! ```
//!
//! A component is out from `fail_step` up to, but excluding, `repair_step`;
//! without a repair step it stays out until the horizon ends.

use crate::{Scenario, ScenarioStore};
use anyhow::{anyhow, Context, Result};
use dnr_core::Component;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub version: Option<u32>,
    #[serde(default)]
    pub defaults: ScenarioDefaults,
    #[serde(default)]
    pub scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefaults {
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub horizon: Option<u32>,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for ScenarioDefaults {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            horizon: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub scenario_id: String,
    pub description: Option<String>,
    pub weight: Option<f64>,
    pub horizon: Option<u32>,
    #[serde(default)]
    pub events: Vec<OutageEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutageEvent {
    /// "branch" or "bus"
    pub component: String,
    pub id: usize,
    pub fail_step: u32,
    pub repair_step: Option<u32>,
}

pub fn load_spec_from_path(path: &Path) -> Result<ScenarioSet> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading scenario spec '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing scenario spec yaml")
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing scenario spec json")
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing scenario spec"),
    }
}

impl ScenarioSet {
    /// Expand every event list into per-step states.
    pub fn expand(&self) -> Result<ScenarioStore> {
        if self.scenarios.is_empty() {
            return Err(anyhow!("scenario set contains no scenarios"));
        }
        let mut seen = HashSet::new();
        let mut scenarios = Vec::with_capacity(self.scenarios.len());
        for spec in &self.scenarios {
            if spec.scenario_id.trim().is_empty() {
                return Err(anyhow!("scenario_id cannot be empty"));
            }
            if !seen.insert(spec.scenario_id.clone()) {
                return Err(anyhow!("duplicate scenario_id '{}' in spec", spec.scenario_id));
            }
            let scenario = self
                .expand_one(spec)
                .with_context(|| format!("expanding scenario '{}'", spec.scenario_id))?;
            scenarios.push(scenario);
        }
        Ok(ScenarioStore::new(scenarios)?)
    }

    fn expand_one(&self, spec: &ScenarioSpec) -> Result<Scenario> {
        let weight = spec.weight.unwrap_or(self.defaults.weight);
        let implied = spec
            .events
            .iter()
            .map(|e| e.repair_step.unwrap_or(e.fail_step + 1))
            .max()
            .unwrap_or(1);
        let horizon = spec.horizon.or(self.defaults.horizon).unwrap_or(implied) as usize;

        let mut scenario = Scenario::new(spec.scenario_id.clone(), weight, horizon);
        for event in &spec.events {
            let component = Component::from_parts(&event.component, event.id)?;
            let fail = event.fail_step as usize;
            if fail >= horizon {
                return Err(anyhow!(
                    "{component} fails at step {fail}, beyond the horizon of {horizon} steps"
                ));
            }
            let end = match event.repair_step {
                Some(repair) if repair <= event.fail_step => {
                    return Err(anyhow!(
                        "{component} repair step {repair} must come after fail step {fail}"
                    ))
                }
                Some(repair) => (repair as usize).min(horizon),
                None => horizon,
            };
            for t in fail..end {
                scenario.set_out(t, component);
            }
        }
        Ok(scenario)
    }
}
