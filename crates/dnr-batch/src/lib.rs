//! Parallel execution of the resilience pipeline over a scenario store.

pub mod job;
pub mod manifest;
pub mod runner;

pub use job::{ResilienceMetrics, ScenarioRecord, StatusCounts};
pub use manifest::{load_batch_manifest, write_batch_manifest, BatchManifest, MANIFEST_FILE};
pub use runner::{
    load_inputs, prepare_backend, run_batch, validate_inputs, BatchRunnerConfig, BatchSummary,
};
