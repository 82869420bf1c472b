use crate::topology::{Component, SwitchConfig};
use crate::{Branch, BranchId, BusId, Network};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Island found under a given switch configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Island {
    pub island_id: usize,
    pub buses: BTreeSet<BusId>,
    /// Whether at least one substation, DG or microgrid sits inside
    pub sourced: bool,
}

/// Counts behind the "sourced radial forest" test of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadialityReport {
    /// Buses considered (typically the energized set)
    pub buses: usize,
    /// Closed branches with both endpoints inside the considered set
    pub closed_branches: usize,
    pub sourced_subtrees: usize,
    pub unsourced_components: usize,
    /// Components holding more than one substation (a loop through the grid)
    pub multi_substation_components: usize,
}

impl RadialityReport {
    /// A forest with one tree per sourced component and no unsourced islands.
    pub fn is_radial(&self) -> bool {
        self.unsourced_components == 0
            && self.multi_substation_components == 0
            && self.closed_branches + self.sourced_subtrees == self.buses
    }
}

/// Buses reachable from a live source through branches accepted by `usable`.
///
/// Buses in `dead` neither carry nor receive power.
pub fn sourced_reach<F>(network: &Network, dead: &BTreeSet<BusId>, usable: F) -> BTreeSet<BusId>
where
    F: Fn(&Branch) -> bool,
{
    let mut reached = BTreeSet::new();
    let mut queue: VecDeque<BusId> = network
        .source_buses()
        .into_iter()
        .filter(|bus| !dead.contains(bus))
        .collect();
    while let Some(bus) = queue.pop_front() {
        if !reached.insert(bus) {
            continue;
        }
        let Some(idx) = network.node_index(bus) else {
            continue;
        };
        for edge in network.graph.edges(idx) {
            let branch = edge.weight();
            if !usable(branch) {
                continue;
            }
            let next = branch.other_end(bus);
            if !dead.contains(&next) && !reached.contains(&next) {
                queue.push_back(next);
            }
        }
    }
    reached
}

/// Buses energized by the closed branches of `config`.
pub fn energized_buses(
    network: &Network,
    config: &SwitchConfig,
    dead: &BTreeSet<BusId>,
) -> BTreeSet<BusId> {
    sourced_reach(network, dead, |branch| config.is_closed(branch.id))
}

/// Out-of-service branches in an outage set.
pub fn faulted_branches(outages: &BTreeSet<Component>) -> BTreeSet<BranchId> {
    outages
        .iter()
        .filter_map(|c| match c {
            Component::Branch(id) => Some(*id),
            Component::Bus(_) => None,
        })
        .collect()
}

/// Buses that must stay de-energized while `outages` persist.
///
/// Seeds are faulted buses and both ends of faulted non-switchable branches;
/// the zone then grows across healthy non-switchable branches, since nothing
/// can separate their ends. Healthy switchable branches bound the zone.
pub fn fault_zone(network: &Network, outages: &BTreeSet<Component>) -> BTreeSet<BusId> {
    let faulted = faulted_branches(outages);
    let mut queue: VecDeque<BusId> = VecDeque::new();
    for component in outages {
        match component {
            Component::Bus(id) if network.bus(*id).is_some() => queue.push_back(*id),
            Component::Branch(id) => {
                if let Some(branch) = network.branch(*id).filter(|b| !b.switchable) {
                    queue.push_back(branch.from_bus);
                    queue.push_back(branch.to_bus);
                }
            }
            Component::Bus(_) => {}
        }
    }
    let mut zone = BTreeSet::new();
    while let Some(bus) = queue.pop_front() {
        if !zone.insert(bus) {
            continue;
        }
        for branch in network.incident_branches(bus) {
            if branch.switchable || faulted.contains(&branch.id) {
                continue;
            }
            let next = branch.other_end(bus);
            if !zone.contains(&next) {
                queue.push_back(next);
            }
        }
    }
    zone
}

/// Breadth-first labelling of the components formed by closed branches,
/// restricted to `within`.
pub fn islands(network: &Network, config: &SwitchConfig, within: &BTreeSet<BusId>) -> Vec<Island> {
    let mut visited = HashSet::new();
    let mut islands = Vec::new();
    for &start in within {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        let mut members = BTreeSet::new();
        while let Some(bus) = queue.pop_front() {
            if !visited.insert(bus) {
                continue;
            }
            members.insert(bus);
            for branch in network.incident_branches(bus) {
                if !config.is_closed(branch.id) {
                    continue;
                }
                let next = branch.other_end(bus);
                if within.contains(&next) && !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }
        let sourced = members.iter().any(|bus| network.is_source(*bus));
        islands.push(Island {
            island_id: islands.len(),
            buses: members,
            sourced,
        });
    }
    islands
}

/// Check that the closed branches of `config` form a forest over `within`
/// with one tree per sourced component.
pub fn radiality(network: &Network, config: &SwitchConfig, within: &BTreeSet<BusId>) -> RadialityReport {
    let position: BTreeMap<BusId, usize> = within.iter().enumerate().map(|(i, b)| (*b, i)).collect();
    let mut forest = UnionFind::<usize>::new(position.len());
    let mut closed_branches = 0;
    for branch in network.branches() {
        if !config.is_closed(branch.id) {
            continue;
        }
        let (Some(&a), Some(&b)) = (position.get(&branch.from_bus), position.get(&branch.to_bus)) else {
            continue;
        };
        closed_branches += 1;
        forest.union(a, b);
    }

    let mut sourced_roots = BTreeSet::new();
    let mut all_roots = BTreeSet::new();
    let mut substations: BTreeMap<usize, usize> = BTreeMap::new();
    for (bus, &i) in &position {
        let root = forest.find(i);
        all_roots.insert(root);
        if network.is_source(*bus) {
            sourced_roots.insert(root);
        }
        if network.bus(*bus).is_some_and(|b| b.is_substation()) {
            *substations.entry(root).or_default() += 1;
        }
    }

    RadialityReport {
        buses: position.len(),
        closed_branches,
        sourced_subtrees: sourced_roots.len(),
        unsourced_components: all_roots.len() - sourced_roots.len(),
        multi_substation_components: substations.values().filter(|n| **n > 1).count(),
    }
}
