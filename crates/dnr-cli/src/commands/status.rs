//! `dnr status`: which artifacts a run left behind.

use anyhow::Result;
use dnr_algo::ArtifactTable;
use dnr_batch::{load_batch_manifest, MANIFEST_FILE};
use dnr_io::artifact_status;
use std::io::{self, Write};
use std::path::Path;
use tabwriter::TabWriter;
use tracing::warn;

pub fn handle(out: &Path, json: bool) -> Result<()> {
    let mut expected: Vec<&str> = ArtifactTable::ALL.iter().map(|t| t.as_str()).collect();
    expected.push(MANIFEST_FILE);
    let report = artifact_status(out, &expected);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "ARTIFACT\tPRESENT\tBYTES\tMODIFIED")?;
    for artifact in &report.artifacts {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            artifact.name,
            if artifact.present { "yes" } else { "no" },
            artifact.bytes.map_or_else(|| "-".to_string(), |b| b.to_string()),
            artifact
                .modified
                .map_or_else(|| "-".to_string(), |m| m.to_rfc3339())
        )?;
    }
    writer.flush()?;

    let manifest_path = out.join(MANIFEST_FILE);
    if manifest_path.is_file() {
        match load_batch_manifest(&manifest_path) {
            Ok(manifest) => {
                println!();
                println!(
                    "Last batch: {} scenarios (OK {}, INFEASIBLE {}, TIMEOUT {}) at {}",
                    manifest.num_scenarios,
                    manifest.counts.ok,
                    manifest.counts.infeasible,
                    manifest.counts.timeout,
                    manifest.created_at.to_rfc3339()
                );
            }
            Err(err) => warn!("unreadable batch manifest: {err:#}"),
        }
    }
    if !report.all_present() {
        println!("{} artifact(s) missing", report.missing().count());
    }
    Ok(())
}
