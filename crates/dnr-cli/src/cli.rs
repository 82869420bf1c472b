use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dnr", author, version, about = "AC/DC hybrid distribution network resilience assessment", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify, reconfigure and schedule MESS for every scenario
    Run {
        #[command(flatten)]
        args: RunArgs,
        /// Stop after `classify` or `reconfigure` instead of the full pipeline
        #[arg(long, value_enum)]
        stages: Option<StageArg>,
    },
    /// Label every scenario step with its resilience phase only
    Classify {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Classify and run the rolling reconfiguration, without MESS scheduling
    Reconfigure {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Check network and scenario inputs and print every diagnostic
    Validate {
        /// Network directory (buses.csv, branches.csv, ...)
        #[arg(long, value_hint = ValueHint::DirPath)]
        network: PathBuf,
        /// Scenario directory, states CSV or YAML/JSON event spec
        #[arg(long, value_hint = ValueHint::AnyPath)]
        scenarios: Option<PathBuf>,
    },
    /// List the artifacts present in an output directory
    Status {
        /// Output directory of a previous run
        #[arg(long, value_hint = ValueHint::DirPath)]
        out: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List compiled optimization backends
    Solvers {
        /// Solve a trivial model with each backend
        #[arg(long)]
        probe: bool,
    },
}

/// Inputs, outputs and overrides shared by the pipeline commands.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Network directory (buses.csv, branches.csv, ...)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub network: PathBuf,
    /// Scenario directory, states CSV or YAML/JSON event spec
    #[arg(long, value_hint = ValueHint::AnyPath)]
    pub scenarios: PathBuf,
    /// Output directory for artifact tables and manifests
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub out: PathBuf,
    /// Pipeline configuration (TOML)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Worker threads (0 = all CPUs)
    #[arg(long)]
    pub threads: Option<usize>,
    /// Optimization backend (see `dnr solvers`)
    #[arg(long)]
    pub solver: Option<String>,
    /// Time limit for a single solve, in milliseconds
    #[arg(long)]
    pub solve_time_limit_ms: Option<u64>,
    /// Overall time budget per scenario, in milliseconds
    #[arg(long)]
    pub scenario_deadline_ms: Option<u64>,
    /// Artifact table format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageArg {
    Classify,
    Reconfigure,
    Full,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Parquet,
    Csv,
}
