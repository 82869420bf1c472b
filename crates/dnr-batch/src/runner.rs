use crate::job::{ResilienceMetrics, ScenarioRecord, StatusCounts};
use crate::manifest::{write_batch_manifest, BatchManifest, MANIFEST_FILE};
use anyhow::{Context, Result};
use chrono::Utc;
use dnr_algo::{
    run_scenario, ArtifactWriter, BackendKind, OptimizationBackend, PipelineConfig, ScenarioOutcome,
};
use dnr_core::{Diagnostics, DnrError, DnrResult, Network};
use dnr_scenarios::ScenarioStore;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Everything one batch run needs; the network and scenarios are shared
/// read-only by every worker.
pub struct BatchRunnerConfig {
    pub network: Arc<Network>,
    pub scenarios: Arc<ScenarioStore>,
    pub pipeline: PipelineConfig,
    pub output_root: PathBuf,
}

/// Outcomes in scenario order plus where the run left its files.
pub struct BatchSummary {
    pub outcomes: Vec<ScenarioOutcome>,
    pub manifest: BatchManifest,
    pub manifest_path: PathBuf,
    pub artifacts: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn counts(&self) -> StatusCounts {
        self.manifest.counts
    }
}

/// Load and validate the inputs of a run.
///
/// Unreadable tables and failed checks both surface as
/// [`DnrError::MalformedInput`], before a single model is built. Every
/// diagnostic is logged.
pub fn load_inputs(network_dir: &Path, scenarios: &Path) -> DnrResult<(Network, ScenarioStore)> {
    let network = dnr_io::load_network(network_dir).map_err(|err| {
        DnrError::malformed(format!("network '{}': {err:#}", network_dir.display()))
    })?;
    let store = dnr_io::load_scenarios(scenarios).map_err(|err| {
        DnrError::malformed(format!("scenarios '{}': {err:#}", scenarios.display()))
    })?;
    validate_inputs(&network, &store)?;
    Ok((network, store))
}

pub fn validate_inputs(network: &Network, scenarios: &ScenarioStore) -> DnrResult<()> {
    let mut diag = Diagnostics::new();
    network.validate_into(&mut diag);
    scenarios.validate_into(network, &mut diag);
    for issue in &diag.issues {
        match issue.severity {
            dnr_core::Severity::Warning => warn!("{issue}"),
            dnr_core::Severity::Error => error!("{issue}"),
        }
    }
    diag.into_result()
}

/// Resolve the configured backend and make sure it can solve a trivial model.
pub fn prepare_backend(pipeline: &PipelineConfig) -> DnrResult<Arc<dyn OptimizationBackend>> {
    let kind: BackendKind = pipeline.solver.backend.parse()?;
    let backend = kind.create();
    if pipeline.batch.stages.runs_reconfiguration() {
        backend.probe()?;
        info!(backend = backend.name(), "solver backend ready");
    }
    Ok(backend)
}

pub fn run_batch(config: &BatchRunnerConfig) -> Result<BatchSummary> {
    let started = Instant::now();
    config.pipeline.validate()?;
    validate_inputs(&config.network, &config.scenarios)?;
    let backend = prepare_backend(&config.pipeline)?;

    fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "creating batch output root '{}'",
            config.output_root.display()
        )
    })?;

    let thread_count = if config.pipeline.batch.threads == 0 {
        num_cpus::get()
    } else {
        config.pipeline.batch.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for batch runs")?;
    info!(
        scenarios = config.scenarios.len(),
        threads = thread_count,
        stages = config.pipeline.batch.stages.as_str(),
        "starting batch"
    );

    // Stops at the first fatal error; per-scenario failures live in the outcomes.
    let outcomes: Vec<ScenarioOutcome> = pool.install(|| {
        config
            .scenarios
            .scenarios()
            .par_iter()
            .map(|scenario| {
                run_scenario(&config.network, scenario, &config.pipeline, backend.as_ref())
                    .map_err(|err| {
                        error!(scenario = %scenario.id, kind = err.kind(), "{err}");
                        err
                    })
            })
            .collect::<Result<Vec<_>, DnrError>>()
    })?;

    let format = config.pipeline.batch.output_format;
    let artifacts = ArtifactWriter::new(&config.output_root, format).write_all(&outcomes)?;

    let records: Vec<ScenarioRecord> = outcomes.iter().map(ScenarioRecord::from_outcome).collect();
    let counts = StatusCounts::tally(&records);
    let metrics = ResilienceMetrics::aggregate(&records);
    let manifest = BatchManifest {
        created_at: Utc::now(),
        backend: backend.name().to_string(),
        stages: config.pipeline.batch.stages.as_str().to_string(),
        output_format: format.extension().to_string(),
        threads: thread_count,
        num_scenarios: records.len(),
        counts,
        metrics,
        artifacts: artifacts
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect(),
        scenarios: records,
    };
    let manifest_path = config.output_root.join(MANIFEST_FILE);
    write_batch_manifest(&manifest_path, &manifest)?;

    info!(
        ok = counts.ok,
        infeasible = counts.infeasible,
        timeout = counts.timeout,
        expected_unserved_mwh = ?metrics.expected_unserved_mwh,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch finished"
    );
    Ok(BatchSummary {
        outcomes,
        manifest,
        manifest_path,
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnr_algo::test_utils::{five_bus_radial, five_bus_scenario, radial_without_backup};
    use dnr_algo::{OutputFormat, StageSelection, StageStatus};
    use dnr_core::{BranchId, Component};
    use dnr_scenarios::Scenario;
    use tempfile::tempdir;

    fn config(network: Network, scenarios: Vec<Scenario>, out: &Path) -> BatchRunnerConfig {
        let mut pipeline = PipelineConfig::default();
        pipeline.batch.threads = 2;
        pipeline.batch.output_format = OutputFormat::Csv;
        BatchRunnerConfig {
            network: Arc::new(network),
            scenarios: Arc::new(ScenarioStore::new(scenarios).unwrap()),
            pipeline,
            output_root: out.to_path_buf(),
        }
    }

    #[test]
    fn runs_scenarios_in_order_and_writes_manifest() {
        let dir = tempdir().unwrap();
        let quiet = Scenario::new("quiet", 0.5, 4);
        let cfg = config(five_bus_radial(), vec![five_bus_scenario(), quiet], dir.path());
        let summary = run_batch(&cfg).unwrap();

        let ids: Vec<_> = summary.outcomes.iter().map(|o| o.scenario_id.as_str()).collect();
        assert_eq!(ids, ["s1", "quiet"]);
        assert_eq!(summary.counts().ok, 2);
        assert_eq!(summary.artifacts.len(), 5);
        assert!(summary.manifest_path.ends_with(MANIFEST_FILE));
        assert!(summary.manifest_path.exists());
        assert!(dir.path().join("scenario_summary.csv").exists());
        assert_eq!(summary.manifest.threads, 2);
        let eue = summary.manifest.metrics.expected_unserved_mwh.unwrap();
        assert!(eue.abs() < 1e-6);
    }

    #[test]
    fn infeasible_scenarios_count_as_unrecoverable_weight() {
        let dir = tempdir().unwrap();
        let stranded = Scenario::new("stranded", 0.3, 6)
            .with_outage(Component::Branch(BranchId::new(2)), 2..=5);
        let quiet = Scenario::new("quiet", 0.7, 6);
        let cfg = config(radial_without_backup(), vec![stranded, quiet], dir.path());
        let summary = run_batch(&cfg).unwrap();

        assert_eq!(summary.outcomes[0].status, StageStatus::Infeasible);
        let metrics = summary.manifest.metrics;
        assert!((metrics.unrecoverable_weight - 0.3).abs() < 1e-12);
        assert!((metrics.ok_weight - 0.7).abs() < 1e-12);
        assert!(metrics.expected_unserved_mwh.unwrap().abs() < 1e-6);
    }

    #[test]
    fn malformed_scenario_aborts_before_solving() {
        let dir = tempdir().unwrap();
        let bad = Scenario::new("bad", 1.0, 4).with_outage(Component::Branch(BranchId::new(42)), 1..=2);
        let cfg = config(five_bus_radial(), vec![bad], dir.path());
        let err = run_batch(&cfg).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<DnrError>(),
            Some(DnrError::MalformedInput(_))
        ));
        assert!(!dir.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn missing_network_tables_are_malformed_input() {
        let dir = tempdir().unwrap();
        let spec = dir.path().join("s.yaml");
        fs::write(&spec, "scenarios:\n  - scenario_id: a\n    horizon: 2\n").unwrap();
        let err = load_inputs(dir.path(), &spec).err().unwrap();
        assert!(matches!(err, DnrError::MalformedInput(ref m) if m.contains("buses.csv")));
    }

    #[test]
    fn unknown_backend_is_fatal() {
        let mut pipeline = PipelineConfig::default();
        pipeline.solver.backend = "cplex".into();
        let err = prepare_backend(&pipeline).err().unwrap();
        assert!(matches!(err, DnrError::BackendUnavailable(_)));
    }

    #[test]
    fn classify_only_skips_the_probe_and_writes_phase_rows() {
        let dir = tempdir().unwrap();
        let mut cfg = config(five_bus_radial(), vec![five_bus_scenario()], dir.path());
        cfg.pipeline.batch.stages = StageSelection::Classify;
        let summary = run_batch(&cfg).unwrap();
        assert!(summary.outcomes[0].plan.is_none());
        assert_eq!(summary.manifest.stages, "classify");
        assert_eq!(summary.manifest.metrics.expected_unserved_mwh, None);
    }
}
