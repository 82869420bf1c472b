//! Monte Carlo failure trajectories.
//!
//! A [`Scenario`] is an ordered sequence of time steps, each holding the set of
//! out-of-service components at that step, plus the cluster weight the scenario
//! represents. The [`ScenarioStore`] owns every scenario of a run and is shared
//! read-only (`Arc<ScenarioStore>`) by the scenario tasks.
//!
//! Scenarios arrive either as a long state table (one row per scenario, step
//! and component) assembled with [`ScenarioStore::assemble`], or as an outage
//! event spec (see [`spec`]).

use dnr_core::{Component, Diagnostics, DnrError, DnrResult, Network};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::RangeInclusive;

pub mod spec;

pub use spec::{load_spec_from_path, OutageEvent, ScenarioDefaults, ScenarioSet, ScenarioSpec};

/// Out-of-service components at one time step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    pub time_step: u32,
    pub out_of_service: BTreeSet<Component>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    /// Cluster weight (probability mass) represented by this trajectory
    pub weight: f64,
    pub steps: Vec<StepState>,
}

impl Scenario {
    /// Scenario with `horizon` steps and no outages.
    pub fn new(id: impl Into<String>, weight: f64, horizon: usize) -> Self {
        let steps = (0..horizon)
            .map(|t| StepState {
                time_step: t as u32,
                out_of_service: BTreeSet::new(),
            })
            .collect();
        Self {
            id: id.into(),
            weight,
            steps,
        }
    }

    /// Mark `component` out of service over the inclusive step range (clamped to the horizon).
    pub fn with_outage(mut self, component: Component, steps: RangeInclusive<usize>) -> Self {
        for t in steps {
            self.set_out(t, component);
        }
        self
    }

    pub fn set_out(&mut self, step: usize, component: Component) {
        if let Some(state) = self.steps.get_mut(step) {
            state.out_of_service.insert(component);
        }
    }

    pub fn horizon(&self) -> usize {
        self.steps.len()
    }

    pub fn outages_at(&self, step: usize) -> Option<&BTreeSet<Component>> {
        self.steps.get(step).map(|s| &s.out_of_service)
    }

    pub fn outage_count(&self, step: usize) -> usize {
        self.outages_at(step).map_or(0, BTreeSet::len)
    }

    pub fn outage_counts(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.out_of_service.len()).collect()
    }

    pub fn has_outage(&self) -> bool {
        self.steps.iter().any(|s| !s.out_of_service.is_empty())
    }

    pub fn first_fault_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.out_of_service.is_empty())
    }

    /// Every component out at some step of `range`.
    pub fn outage_union(&self, range: RangeInclusive<usize>) -> BTreeSet<Component> {
        let mut union = BTreeSet::new();
        for t in range {
            if let Some(state) = self.steps.get(t) {
                union.extend(state.out_of_service.iter().copied());
            }
        }
        union
    }

    /// Outage interval per component, as (first step, last step).
    pub fn outage_intervals(&self) -> BTreeMap<Component, Vec<(usize, usize)>> {
        let mut intervals: BTreeMap<Component, Vec<(usize, usize)>> = BTreeMap::new();
        for (t, state) in self.steps.iter().enumerate() {
            for component in &state.out_of_service {
                let spans = intervals.entry(*component).or_default();
                match spans.last_mut() {
                    Some((_, end)) if *end + 1 == t => *end = t,
                    _ => spans.push((t, t)),
                }
            }
        }
        intervals
    }

    pub fn validate_into(&self, network: &Network, diag: &mut Diagnostics) {
        let entity = format!("Scenario {}", self.id);
        if self.id.trim().is_empty() {
            diag.add_error("scenario", "scenario id cannot be empty");
        }
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            diag.add_error_with_entity("scenario", "weight must be finite and non-negative", &entity);
        }
        if self.steps.is_empty() {
            diag.add_error_with_entity("scenario", "trajectory has no time steps", &entity);
        }
        for (t, state) in self.steps.iter().enumerate() {
            if state.time_step as usize != t {
                diag.add_error_with_entity(
                    "scenario",
                    &format!("time step {} stored at position {}", state.time_step, t),
                    &entity,
                );
                break;
            }
        }
        for (component, spans) in self.outage_intervals() {
            let known = match component {
                Component::Branch(id) => network.branch(id).is_some(),
                Component::Bus(id) => network.bus(id).is_some(),
            };
            if !known {
                diag.add_error_with_entity(
                    "reference",
                    &format!("unknown component {component}"),
                    &entity,
                );
            }
            if spans.len() > 1 {
                diag.add_error_with_entity(
                    "scenario",
                    &format!(
                        "{component} fails again after repair ({} separate outage intervals)",
                        spans.len()
                    ),
                    &entity,
                );
            }
        }
    }
}

/// One row of the long scenario state table.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub scenario_id: String,
    pub time_step: u32,
    pub component: Component,
    pub in_service: bool,
}

/// Weight and optional explicit horizon of one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioHeader {
    pub scenario_id: String,
    pub weight: f64,
    pub horizon: Option<u32>,
}

/// Immutable collection of all scenarios of a run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioStore {
    scenarios: Vec<Scenario>,
}

impl ScenarioStore {
    pub fn new(scenarios: Vec<Scenario>) -> DnrResult<Self> {
        let mut seen = HashSet::new();
        for scenario in &scenarios {
            if !seen.insert(scenario.id.as_str()) {
                return Err(DnrError::malformed(format!(
                    "duplicate scenario id '{}'",
                    scenario.id
                )));
            }
        }
        Ok(Self { scenarios })
    }

    /// Build scenarios from weight headers and state rows.
    ///
    /// Scenarios appear in header order, then in order of first appearance in
    /// the state rows. A scenario without a header gets weight 1.0; its horizon
    /// is one past its last recorded step.
    pub fn assemble(headers: &[ScenarioHeader], records: &[StateRecord]) -> DnrResult<Self> {
        let mut order: Vec<String> = Vec::new();
        let mut header_by_id: BTreeMap<&str, &ScenarioHeader> = BTreeMap::new();
        for header in headers {
            if header_by_id.insert(header.scenario_id.as_str(), header).is_some() {
                return Err(DnrError::malformed(format!(
                    "scenario '{}' has more than one weight row",
                    header.scenario_id
                )));
            }
            order.push(header.scenario_id.clone());
        }

        let mut last_step: BTreeMap<&str, u32> = BTreeMap::new();
        for record in records {
            if !header_by_id.contains_key(record.scenario_id.as_str())
                && !last_step.contains_key(record.scenario_id.as_str())
            {
                order.push(record.scenario_id.clone());
            }
            let entry = last_step.entry(record.scenario_id.as_str()).or_insert(0);
            *entry = (*entry).max(record.time_step);
        }

        let mut scenarios = Vec::with_capacity(order.len());
        for id in &order {
            let header = header_by_id.get(id.as_str());
            let weight = match header {
                Some(h) => h.weight,
                None => {
                    tracing::warn!(scenario = %id, "no weight row; using weight 1.0");
                    1.0
                }
            };
            let observed = last_step.get(id.as_str()).map(|t| *t as usize + 1);
            let horizon = match (header.and_then(|h| h.horizon), observed) {
                (Some(h), Some(seen)) if (h as usize) < seen => {
                    return Err(DnrError::malformed(format!(
                        "scenario '{id}' has state rows at step {} beyond its horizon {h}",
                        seen - 1
                    )))
                }
                (Some(h), _) => h as usize,
                (None, Some(seen)) => seen,
                (None, None) => {
                    return Err(DnrError::malformed(format!(
                        "scenario '{id}' has neither a horizon nor any state rows"
                    )))
                }
            };
            scenarios.push(Scenario::new(id.clone(), weight, horizon));
        }

        let index: BTreeMap<String, usize> = scenarios
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        for record in records.iter().filter(|r| !r.in_service) {
            let i = index[&record.scenario_id];
            scenarios[i].set_out(record.time_step as usize, record.component);
        }

        Self::new(scenarios)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn total_weight(&self) -> f64 {
        self.scenarios.iter().map(|s| s.weight).sum()
    }

    pub fn validate_into(&self, network: &Network, diag: &mut Diagnostics) {
        if self.scenarios.is_empty() {
            diag.add_error("scenario", "scenario store is empty");
        }
        for scenario in &self.scenarios {
            scenario.validate_into(network, diag);
        }
    }

    pub fn validate(&self, network: &Network) -> DnrResult<()> {
        let mut diag = Diagnostics::new();
        self.validate_into(network, &mut diag);
        diag.into_result()
    }
}
