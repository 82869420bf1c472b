//! Switch configurations and outage components.

use crate::error::DnrError;
use crate::{BranchId, BusId, Network};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    Open,
    Closed,
}

impl SwitchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::Open => "open",
            SwitchState::Closed => "closed",
        }
    }

    pub fn from_closed(closed: bool) -> Self {
        if closed {
            SwitchState::Closed
        } else {
            SwitchState::Open
        }
    }
}

/// Open/closed state of every branch at one point of the rolling horizon.
///
/// Non-switchable branches are recorded too; they are only ever opened by a
/// fault, never by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    states: BTreeMap<BranchId, SwitchState>,
}

impl SwitchConfig {
    /// Normal operating configuration: ties open, everything else closed.
    pub fn normal(network: &Network) -> Self {
        let states = network
            .branches()
            .map(|b| (b.id, SwitchState::from_closed(!b.normally_open)))
            .collect();
        Self { states }
    }

    pub fn is_closed(&self, branch: BranchId) -> bool {
        matches!(self.states.get(&branch), Some(SwitchState::Closed))
    }

    pub fn state(&self, branch: BranchId) -> SwitchState {
        SwitchState::from_closed(self.is_closed(branch))
    }

    pub fn set(&mut self, branch: BranchId, state: SwitchState) {
        self.states.insert(branch, state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (BranchId, SwitchState)> + '_ {
        self.states.iter().map(|(id, state)| (*id, *state))
    }

    pub fn closed_branches(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.iter()
            .filter(|(_, state)| *state == SwitchState::Closed)
            .map(|(id, _)| id)
    }

    /// Number of branches whose state differs from `previous`.
    pub fn operations_from(&self, previous: &SwitchConfig) -> usize {
        let mut ids: Vec<BranchId> = self.states.keys().copied().collect();
        ids.extend(previous.states.keys().copied());
        ids.sort();
        ids.dedup();
        ids.into_iter()
            .filter(|id| self.is_closed(*id) != previous.is_closed(*id))
            .count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// An element that can be out of service in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "component", content = "id", rename_all = "lowercase")]
pub enum Component {
    Branch(BranchId),
    Bus(BusId),
}

impl Component {
    pub fn kind(&self) -> &'static str {
        match self {
            Component::Branch(_) => "branch",
            Component::Bus(_) => "bus",
        }
    }

    pub fn id_value(&self) -> usize {
        match self {
            Component::Branch(id) => id.value(),
            Component::Bus(id) => id.value(),
        }
    }

    /// Build from the `(component, component_id)` column pair of the state table.
    pub fn from_parts(kind: &str, id: usize) -> Result<Self, DnrError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "branch" | "line" => Ok(Component::Branch(BranchId::new(id))),
            "bus" | "node" => Ok(Component::Bus(BusId::new(id))),
            other => Err(DnrError::Parse(format!(
                "unknown component kind '{other}'; expected branch or bus"
            ))),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_value())
    }
}

impl FromStr for Component {
    type Err = DnrError;

    /// Parses `branch:3` or `bus:5`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, id) = value
            .split_once(':')
            .ok_or_else(|| DnrError::Parse(format!("component '{value}' must look like kind:id")))?;
        let id: usize = id
            .trim()
            .parse()
            .map_err(|_| DnrError::Parse(format!("component '{value}' has a non-numeric id")))?;
        Component::from_parts(kind, id)
    }
}
