//! `dnr run`, `dnr classify` and `dnr reconfigure`.

use anyhow::Result;
use dnr_algo::{OutputFormat, PipelineConfig, StageSelection};
use dnr_batch::{load_inputs, run_batch, BatchRunnerConfig, BatchSummary};
use dnr_cli::manifest::{record_manifest, RunRecord};
use dnr_cli::{FormatArg, RunArgs, StageArg};
use dnr_core::DnrResult;
use dnr_io::{NETWORK_TABLES, SCENARIO_TABLES};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tabwriter::TabWriter;
use tracing::{error, info};

pub fn stage_selection(arg: StageArg) -> StageSelection {
    match arg {
        StageArg::Classify => StageSelection::Classify,
        StageArg::Reconfigure => StageSelection::Reconfigure,
        StageArg::Full => StageSelection::Full,
    }
}

/// Config file (or defaults) with command-line overrides applied.
pub fn build_config(args: &RunArgs, stages: Option<StageSelection>) -> DnrResult<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(threads) = args.threads {
        config.batch.threads = threads;
    }
    if let Some(solver) = &args.solver {
        config.solver.backend = solver.clone();
    }
    if let Some(limit) = args.solve_time_limit_ms {
        config.solver.solve_time_limit_ms = limit;
    }
    if let Some(deadline) = args.scenario_deadline_ms {
        config.solver.scenario_deadline_ms = deadline;
    }
    if let Some(format) = args.format {
        config.batch.output_format = match format {
            FormatArg::Parquet => OutputFormat::Parquet,
            FormatArg::Csv => OutputFormat::Csv,
        };
    }
    if let Some(stages) = stages {
        config.batch.stages = stages;
    }
    config.validate()?;
    Ok(config)
}

pub fn handle(command: &str, args: &RunArgs, stages: Option<StageSelection>) -> Result<()> {
    let started = Instant::now();
    info!(
        network = %args.network.display(),
        scenarios = %args.scenarios.display(),
        out = %args.out.display(),
        "dnr {command}"
    );
    let result = execute(args, stages);

    let (status, outputs) = match &result {
        Ok(summary) => {
            let mut outputs = summary.artifacts.clone();
            outputs.push(summary.manifest_path.clone());
            ("success", outputs)
        }
        Err(_) => ("failure", Vec::new()),
    };
    let params = params(args, stages);
    let inputs = input_files(args);
    let run = RunRecord {
        command,
        params: &params,
        inputs: &inputs,
        outputs: &outputs,
        status,
        duration_ms: started.elapsed().as_millis(),
    };
    match record_manifest(&args.out, &run) {
        Ok(path) => info!("recorded run manifest {}", path.display()),
        Err(err) => error!("failed to record run manifest: {err:#}"),
    }

    print_summary(&result?, &args.out)
}

fn execute(args: &RunArgs, stages: Option<StageSelection>) -> Result<BatchSummary> {
    let pipeline = build_config(args, stages)?;
    let (network, scenarios) = load_inputs(&args.network, &args.scenarios)?;
    run_batch(&BatchRunnerConfig {
        network: Arc::new(network),
        scenarios: Arc::new(scenarios),
        pipeline,
        output_root: args.out.clone(),
    })
}

fn params(args: &RunArgs, stages: Option<StageSelection>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("network", args.network.display().to_string()),
        ("scenarios", args.scenarios.display().to_string()),
        ("out", args.out.display().to_string()),
    ];
    if let Some(config) = &args.config {
        params.push(("config", config.display().to_string()));
    }
    if let Some(stages) = stages {
        params.push(("stages", stages.as_str().to_string()));
    }
    if let Some(threads) = args.threads {
        params.push(("threads", threads.to_string()));
    }
    if let Some(solver) = &args.solver {
        params.push(("solver", solver.clone()));
    }
    if let Some(limit) = args.solve_time_limit_ms {
        params.push(("solve_time_limit_ms", limit.to_string()));
    }
    if let Some(deadline) = args.scenario_deadline_ms {
        params.push(("scenario_deadline_ms", deadline.to_string()));
    }
    if let Some(format) = args.format {
        let label = match format {
            FormatArg::Parquet => "parquet",
            FormatArg::Csv => "csv",
        };
        params.push(("format", label.to_string()));
    }
    params
}

fn input_files(args: &RunArgs) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = NETWORK_TABLES
        .iter()
        .map(|table| args.network.join(table))
        .filter(|path| path.is_file())
        .collect();
    if args.scenarios.is_dir() {
        files.extend(
            SCENARIO_TABLES
                .iter()
                .map(|table| args.scenarios.join(table))
                .filter(|path| path.is_file()),
        );
    } else {
        files.push(args.scenarios.clone());
    }
    if let Some(config) = &args.config {
        files.push(config.clone());
    }
    files
}

fn print_summary(summary: &BatchSummary, out: &Path) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(
        writer,
        "SCENARIO\tWEIGHT\tSTATUS\tFAILED STAGE\tUNSERVED MWH\tELAPSED MS"
    )?;
    for outcome in &summary.outcomes {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}",
            outcome.scenario_id,
            outcome.weight,
            outcome.status,
            outcome.failed_stage.as_deref().unwrap_or("-"),
            outcome
                .unserved_mwh()
                .map_or_else(|| "-".to_string(), |u| format!("{u:.4}")),
            outcome.elapsed.as_millis()
        )?;
    }
    writer.flush()?;

    let counts = summary.counts();
    let metrics = &summary.manifest.metrics;
    println!();
    println!(
        "Scenarios: {} (OK {}, INFEASIBLE {}, TIMEOUT {})",
        counts.total(),
        counts.ok,
        counts.infeasible,
        counts.timeout
    );
    match metrics.expected_unserved_mwh {
        Some(eue) => println!("Expected unserved energy: {eue:.4} MWh"),
        None => println!("Expected unserved energy: n/a"),
    }
    println!("Unrecoverable weight: {:.4}", metrics.unrecoverable_weight);
    println!("Artifacts written to {}", out.display());
    Ok(())
}
