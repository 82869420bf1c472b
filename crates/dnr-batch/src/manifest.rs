use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::job::{ResilienceMetrics, ScenarioRecord, StatusCounts};

pub const MANIFEST_FILE: &str = "batch_manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub backend: String,
    pub stages: String,
    pub output_format: String,
    pub threads: usize,
    pub num_scenarios: usize,
    pub counts: StatusCounts,
    pub metrics: ResilienceMetrics,
    pub artifacts: Vec<String>,
    pub scenarios: Vec<ScenarioRecord>,
}

pub fn write_batch_manifest(path: &Path, manifest: &BatchManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(manifest).context("serializing batch manifest to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("writing batch manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_batch_manifest(path: &Path) -> Result<BatchManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening batch manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing batch manifest '{}'", path.display()))
}
