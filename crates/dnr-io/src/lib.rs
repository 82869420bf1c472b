//! # dnr-io: input tables and artifact inspection
//!
//! A network directory holds one CSV table per element class:
//!
//! | File | Required | Rows |
//! |------|----------|------|
//! | `buses.csv` | yes | AC/DC buses with load and generation bounds |
//! | `branches.csv` | yes | lines and interlink converters, switch flags |
//! | `resources.csv` | no | DGs and microgrids |
//! | `mess.csv` | no | mobile energy storage units |
//! | `travel_times.csv` | no | road travel steps between MESS stations |
//!
//! Scenarios come either from a long `scenario_states.csv` table (with an
//! optional `scenario_weights.csv` beside it) or from a YAML/JSON outage event
//! spec. Loaders only parse and assemble; [`dnr_core::Network::validate_into`]
//! and [`dnr_scenarios::ScenarioStore::validate_into`] decide whether the data
//! is usable.

pub mod hash;
pub mod network;
pub mod scenarios;
pub mod status;
mod tables;

pub use hash::compute_sha256;
pub use network::{load_network, NETWORK_TABLES};
pub use scenarios::{load_scenario_tables, load_scenarios, SCENARIO_TABLES};
pub use status::{artifact_status, ArtifactStatus, StatusReport};
pub use tables::InputError;
