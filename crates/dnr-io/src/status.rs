//! Presence report for the artifacts of an output directory.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Extensions tried, in order, for an artifact given without one.
const TABLE_EXTENSIONS: [&str; 2] = ["parquet", "csv"];

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub name: String,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub dir: PathBuf,
    pub artifacts: Vec<ArtifactStatus>,
}

impl StatusReport {
    pub fn all_present(&self) -> bool {
        self.artifacts.iter().all(|a| a.present)
    }

    pub fn missing(&self) -> impl Iterator<Item = &ArtifactStatus> {
        self.artifacts.iter().filter(|a| !a.present)
    }
}

/// Check `dir` for each expected artifact.
///
/// Names with an extension (`batch_manifest.json`) are looked up as given;
/// bare table names match `<name>.parquet` or `<name>.csv`.
pub fn artifact_status(dir: &Path, expected: &[&str]) -> StatusReport {
    let artifacts = expected
        .iter()
        .map(|name| {
            let candidates: Vec<PathBuf> = if Path::new(name).extension().is_some() {
                vec![dir.join(name)]
            } else {
                TABLE_EXTENSIONS
                    .iter()
                    .map(|ext| dir.join(format!("{name}.{ext}")))
                    .collect()
            };
            let found = candidates.into_iter().find_map(|path| {
                let meta = std::fs::metadata(&path).ok().filter(|m| m.is_file())?;
                Some((path, meta))
            });
            match found {
                Some((path, meta)) => ArtifactStatus {
                    name: name.to_string(),
                    present: true,
                    path: Some(path),
                    bytes: Some(meta.len()),
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                },
                None => ArtifactStatus {
                    name: name.to_string(),
                    present: false,
                    path: None,
                    bytes: None,
                    modified: None,
                },
            }
        })
        .collect();
    StatusReport {
        dir: dir.to_path_buf(),
        artifacts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reports_presence_and_size() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("phase_classification.csv"), "a,b\n1,2\n").unwrap();
        fs::write(dir.path().join("batch_manifest.json"), "{}").unwrap();

        let report = artifact_status(
            dir.path(),
            &["phase_classification", "scenario_summary", "batch_manifest.json"],
        );
        assert!(!report.all_present());
        let phase = &report.artifacts[0];
        assert!(phase.present);
        assert_eq!(phase.bytes, Some(8));
        assert!(phase.path.as_ref().unwrap().ends_with("phase_classification.csv"));
        let missing: Vec<_> = report.missing().map(|a| a.name.as_str()).collect();
        assert_eq!(missing, ["scenario_summary"]);
        assert_eq!(report.artifacts[2].bytes, Some(2));
    }

    #[test]
    fn parquet_is_preferred_over_csv() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("scenario_summary.csv"), "x\n").unwrap();
        fs::write(dir.path().join("scenario_summary.parquet"), "PAR1").unwrap();
        let report = artifact_status(dir.path(), &["scenario_summary"]);
        assert!(report.all_present());
        assert_eq!(report.artifacts[0].bytes, Some(4));
    }

    #[test]
    fn missing_directory_reports_everything_absent() {
        let dir = tempdir().unwrap();
        let report = artifact_status(&dir.path().join("nope"), &["dispatch_results"]);
        assert_eq!(report.missing().count(), 1);
    }
}
