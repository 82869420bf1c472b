use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record of one CLI invocation, written beside its outputs.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub status: String,
    pub duration_ms: u128,
    pub params: Vec<Param>,
    pub inputs: Vec<InputHash>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InputHash {
    pub path: String,
    pub sha256: Option<String>,
}

/// Everything about a finished run except its identity and timestamp.
pub struct RunRecord<'a> {
    pub command: &'a str,
    pub params: &'a [(&'a str, String)],
    pub inputs: &'a [PathBuf],
    pub outputs: &'a [PathBuf],
    pub status: &'a str,
    pub duration_ms: u128,
}

/// Hash the inputs and write `run-<uuid>.json` into `dir`.
pub fn record_manifest(dir: &Path, run: &RunRecord<'_>) -> Result<PathBuf> {
    let run_id = Uuid::new_v4().to_string();
    fs::create_dir_all(dir)
        .with_context(|| format!("creating manifest directory '{}'", dir.display()))?;
    let inputs = run
        .inputs
        .iter()
        .map(|path| InputHash {
            path: path.display().to_string(),
            // Unreadable inputs are recorded without a hash.
            sha256: dnr_io::compute_sha256(path).ok(),
        })
        .collect();
    let manifest = ManifestEntry {
        run_id: run_id.clone(),
        command: run.command.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        status: run.status.to_string(),
        duration_ms: run.duration_ms,
        params: run
            .params
            .iter()
            .map(|(k, v)| Param {
                name: k.to_string(),
                value: v.clone(),
            })
            .collect(),
        inputs,
        outputs: run.outputs.iter().map(|p| p.display().to_string()).collect(),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = dir.join(format!("run-{}.json", run_id));
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let manifest = serde_json::from_str(&json)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_records_hashes_and_params() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("buses.csv");
        fs::write(&input, "abc").unwrap();
        let missing = dir.path().join("gone.csv");
        let params = [("threads", "2".to_string())];
        let path = record_manifest(
            dir.path(),
            &RunRecord {
                command: "run",
                params: &params,
                inputs: &[input, missing],
                outputs: &[dir.path().join("scenario_summary.parquet")],
                status: "success",
                duration_ms: 42,
            },
        )
        .unwrap();

        let manifest = read_manifest(&path).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("run-"));
        assert_eq!(manifest.command, "run");
        assert_eq!(manifest.params[0].value, "2");
        assert_eq!(
            manifest.inputs[0].sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert!(manifest.inputs[1].sha256.is_none());
        assert_eq!(manifest.duration_ms, 42);
    }
}
