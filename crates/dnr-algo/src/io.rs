//! Tabular artifacts of a run, written as parquet or CSV through polars.

use crate::config::OutputFormat;
use crate::pipeline::ScenarioOutcome;
use anyhow::{Context, Result};
use polars::prelude::{CsvWriter, DataFrame, NamedFrom, ParquetWriter, PolarsResult, SerWriter, Series};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactTable {
    PhaseClassification,
    ReconfigurationResults,
    ReconfigurationStatus,
    DispatchResults,
    ScenarioSummary,
}

impl ArtifactTable {
    pub const ALL: [ArtifactTable; 5] = [
        ArtifactTable::PhaseClassification,
        ArtifactTable::ReconfigurationResults,
        ArtifactTable::ReconfigurationStatus,
        ArtifactTable::DispatchResults,
        ArtifactTable::ScenarioSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactTable::PhaseClassification => "phase_classification",
            ArtifactTable::ReconfigurationResults => "reconfiguration_results",
            ArtifactTable::ReconfigurationStatus => "reconfiguration_status",
            ArtifactTable::DispatchResults => "dispatch_results",
            ArtifactTable::ScenarioSummary => "scenario_summary",
        }
    }
}

pub fn artifact_path(dir: &Path, table: ArtifactTable, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", table.as_str(), format.extension()))
}

/// Write `df` to `output`, creating parent directories as needed.
pub fn persist_dataframe(df: &mut DataFrame, output: &Path, format: OutputFormat) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    let mut file = File::create(output)
        .with_context(|| format!("creating output '{}'", output.display()))?;
    match format {
        OutputFormat::Parquet => {
            ParquetWriter::new(&mut file)
                .finish(df)
                .context("writing Parquet output")?;
        }
        OutputFormat::Csv => {
            CsvWriter::new(&mut file)
                .finish(df)
                .context("writing CSV output")?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    format: OutputFormat,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn path(&self, table: ArtifactTable) -> PathBuf {
        artifact_path(&self.dir, table, self.format)
    }

    /// Write every artifact table for `outcomes` and return the files written.
    pub fn write_all(&self, outcomes: &[ScenarioOutcome]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(ArtifactTable::ALL.len());
        for table in ArtifactTable::ALL {
            let mut df = build_frame(table, outcomes)
                .with_context(|| format!("building {} table", table.as_str()))?;
            let path = self.path(table);
            persist_dataframe(&mut df, &path, self.format)?;
            debug!(table = table.as_str(), rows = df.height(), path = %path.display(), "artifact written");
            written.push(path);
        }
        Ok(written)
    }
}

pub fn build_frame(table: ArtifactTable, outcomes: &[ScenarioOutcome]) -> PolarsResult<DataFrame> {
    match table {
        ArtifactTable::PhaseClassification => phase_frame(outcomes),
        ArtifactTable::ReconfigurationResults => reconfiguration_frame(outcomes),
        ArtifactTable::ReconfigurationStatus => status_frame(outcomes),
        ArtifactTable::DispatchResults => dispatch_frame(outcomes),
        ArtifactTable::ScenarioSummary => summary_frame(outcomes),
    }
}

fn phase_frame(outcomes: &[ScenarioOutcome]) -> PolarsResult<DataFrame> {
    let mut scenario_id = Vec::new();
    let mut time_step = Vec::new();
    let mut phase = Vec::new();
    let mut outage_count = Vec::new();
    for outcome in outcomes {
        for step in &outcome.timeline.steps {
            scenario_id.push(outcome.scenario_id.as_str());
            time_step.push(step.time_step as u32);
            phase.push(step.phase.as_str());
            outage_count.push(step.outage_count as u32);
        }
    }
    DataFrame::new(vec![
        Series::new("scenario_id", scenario_id),
        Series::new("time_step", time_step),
        Series::new("phase", phase),
        Series::new("outage_count", outage_count),
    ])
}

fn reconfiguration_frame(outcomes: &[ScenarioOutcome]) -> PolarsResult<DataFrame> {
    let mut scenario_id = Vec::new();
    let mut phase = Vec::new();
    let mut stage = Vec::new();
    let mut branch_id = Vec::new();
    let mut switch_state = Vec::new();
    let mut flow_mw = Vec::new();
    for outcome in outcomes.iter().filter(|o| o.persists_stage_rows()) {
        let Some(plan) = &outcome.plan else {
            continue;
        };
        for report in &plan.reports {
            let Some(config) = &report.config else {
                continue;
            };
            for (branch, state) in config.iter() {
                scenario_id.push(outcome.scenario_id.as_str());
                phase.push(report.phase.as_str());
                stage.push(report.stage.as_str());
                branch_id.push(branch.value() as u32);
                switch_state.push(state.as_str());
                flow_mw.push(report.flows.get(&branch).copied());
            }
        }
    }
    DataFrame::new(vec![
        Series::new("scenario_id", scenario_id),
        Series::new("phase", phase),
        Series::new("stage", stage),
        Series::new("branch_id", branch_id),
        Series::new("switch_state", switch_state),
        Series::new("flow_mw", flow_mw),
    ])
}

fn status_frame(outcomes: &[ScenarioOutcome]) -> PolarsResult<DataFrame> {
    let mut scenario_id = Vec::new();
    let mut phase = Vec::new();
    let mut stage = Vec::new();
    let mut status = Vec::new();
    let mut served_mw = Vec::new();
    let mut switch_operations = Vec::new();
    let mut infeasible = Vec::new();
    let mut message: Vec<Option<&str>> = Vec::new();
    for outcome in outcomes.iter().filter(|o| o.persists_stage_rows()) {
        let Some(plan) = &outcome.plan else {
            continue;
        };
        for report in &plan.reports {
            scenario_id.push(outcome.scenario_id.as_str());
            phase.push(report.phase.as_str());
            stage.push(report.stage.as_str());
            status.push(report.status.as_str());
            served_mw.push(report.served_mw);
            switch_operations.push(report.switch_operations as u32);
            infeasible.push(!report.is_ok());
            message.push(report.message.as_deref());
        }
    }
    DataFrame::new(vec![
        Series::new("scenario_id", scenario_id),
        Series::new("phase", phase),
        Series::new("stage", stage),
        Series::new("status", status),
        Series::new("served_mw", served_mw),
        Series::new("switch_operations", switch_operations),
        Series::new("infeasible", infeasible),
        Series::new("message", message),
    ])
}

fn dispatch_frame(outcomes: &[ScenarioOutcome]) -> PolarsResult<DataFrame> {
    let mut scenario_id = Vec::new();
    let mut time_step = Vec::new();
    let mut unit_id = Vec::new();
    let mut location = Vec::new();
    let mut power_mw = Vec::new();
    let mut soc_mwh = Vec::new();
    let schedules = outcomes
        .iter()
        .filter(|o| o.persists_stage_rows())
        .filter_map(|o| o.schedule.as_ref().map(|s| (o.scenario_id.as_str(), s)));
    for (id, schedule) in schedules {
        for entry in &schedule.entries {
            scenario_id.push(id);
            time_step.push(entry.time_step as u32);
            unit_id.push(entry.unit.value() as u32);
            location.push(entry.location.to_string());
            power_mw.push(entry.power_mw);
            soc_mwh.push(entry.soc_mwh);
        }
    }
    DataFrame::new(vec![
        Series::new("scenario_id", scenario_id),
        Series::new("time_step", time_step),
        Series::new("unit_id", unit_id),
        Series::new("location", location),
        Series::new("power_mw", power_mw),
        Series::new("soc_mwh", soc_mwh),
    ])
}

fn summary_frame(outcomes: &[ScenarioOutcome]) -> PolarsResult<DataFrame> {
    let scenario_id: Vec<&str> = outcomes.iter().map(|o| o.scenario_id.as_str()).collect();
    let weight: Vec<f64> = outcomes.iter().map(|o| o.weight).collect();
    let status: Vec<&str> = outcomes.iter().map(|o| o.status.as_str()).collect();
    let failed_stage: Vec<Option<&str>> = outcomes.iter().map(|o| o.failed_stage.as_deref()).collect();
    let unserved: Vec<Option<f64>> = outcomes.iter().map(ScenarioOutcome::unserved_mwh).collect();
    let weighted: Vec<Option<f64>> = outcomes
        .iter()
        .map(ScenarioOutcome::weighted_unserved_mwh)
        .collect();
    let elapsed_ms: Vec<u64> = outcomes.iter().map(|o| o.elapsed.as_millis() as u64).collect();
    let error: Vec<Option<&str>> = outcomes.iter().map(|o| o.error.as_deref()).collect();
    DataFrame::new(vec![
        Series::new("scenario_id", scenario_id),
        Series::new("weight", weight),
        Series::new("status", status),
        Series::new("failed_stage", failed_stage),
        Series::new("unserved_mwh", unserved),
        Series::new("weighted_unserved_mwh", weighted),
        Series::new("elapsed_ms", elapsed_ms),
        Series::new("error", error),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::lp::GoodLpBackend;
    use crate::pipeline::run_scenario;
    use crate::test_utils::{five_bus_radial, five_bus_scenario, read_artifact};
    use dnr_scenarios::Scenario;
    use tempfile::tempdir;

    fn outcomes() -> Vec<ScenarioOutcome> {
        let network = five_bus_radial();
        let config = PipelineConfig::default();
        let backend = GoodLpBackend::default();
        vec![
            run_scenario(&network, &five_bus_scenario(), &config, &backend).unwrap(),
            run_scenario(&network, &Scenario::new("calm", 2.0, 4), &config, &backend).unwrap(),
        ]
    }

    #[test]
    fn writes_every_table_as_parquet() {
        let dir = tempdir().unwrap();
        let outcomes = outcomes();
        let written = ArtifactWriter::new(dir.path(), OutputFormat::Parquet)
            .write_all(&outcomes)
            .unwrap();
        assert_eq!(written.len(), 5);

        let phases = read_artifact(dir.path(), ArtifactTable::PhaseClassification, OutputFormat::Parquet).unwrap();
        assert_eq!(phases.height(), 8 + 4);
        assert_eq!(
            phases.get_column_names(),
            vec!["scenario_id", "time_step", "phase", "outage_count"]
        );

        let results =
            read_artifact(dir.path(), ArtifactTable::ReconfigurationResults, OutputFormat::Parquet).unwrap();
        // Three stages over four branches for the faulted scenario only.
        assert_eq!(results.height(), 12);

        let summary = read_artifact(dir.path(), ArtifactTable::ScenarioSummary, OutputFormat::Parquet).unwrap();
        assert_eq!(summary.height(), 2);
        assert_eq!(summary.get_column_names().len(), 8);
    }

    #[test]
    fn writes_csv_when_requested() {
        let dir = tempdir().unwrap();
        ArtifactWriter::new(dir.path().join("nested"), OutputFormat::Csv)
            .write_all(&outcomes())
            .unwrap();
        let status = read_artifact(
            &dir.path().join("nested"),
            ArtifactTable::ReconfigurationStatus,
            OutputFormat::Csv,
        )
        .unwrap();
        assert_eq!(status.height(), 3);
        assert!(dir.path().join("nested/dispatch_results.csv").exists());
    }

    #[test]
    fn timed_out_scenarios_keep_only_summary_and_phases() {
        let network = five_bus_radial();
        let mut config = PipelineConfig::default();
        config.solver.scenario_deadline_ms = 0;
        let outcome = run_scenario(&network, &five_bus_scenario(), &config, &GoodLpBackend::default()).unwrap();
        let outcomes = vec![outcome];
        assert_eq!(build_frame(ArtifactTable::ReconfigurationStatus, &outcomes).unwrap().height(), 0);
        assert_eq!(build_frame(ArtifactTable::ReconfigurationResults, &outcomes).unwrap().height(), 0);
        assert_eq!(build_frame(ArtifactTable::ScenarioSummary, &outcomes).unwrap().height(), 1);
        assert_eq!(build_frame(ArtifactTable::PhaseClassification, &outcomes).unwrap().height(), 8);
    }
}
