use clap::Parser;
use dnr_algo::StageSelection;
use dnr_cli::{Cli, Commands};
use dnr_core::DnrError;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;

/// Exit status: 2 for unusable input or configuration, 3 when no solver
/// backend can be reached, 1 for anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<DnrError>() {
        Some(DnrError::MalformedInput(_) | DnrError::Parse(_) | DnrError::Config(_)) => 2,
        Some(DnrError::BackendUnavailable(_)) => 3,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match &cli.command {
        Commands::Run { args, stages } => commands::run::handle(
            "run",
            args,
            stages.map(commands::run::stage_selection),
        ),
        Commands::Classify { args } => {
            commands::run::handle("classify", args, Some(StageSelection::Classify))
        }
        Commands::Reconfigure { args } => {
            commands::run::handle("reconfigure", args, Some(StageSelection::Reconfigure))
        }
        Commands::Validate { network, scenarios } => {
            commands::validate::handle(network, scenarios.as_deref())
        }
        Commands::Status { out, json } => commands::status::handle(out, *json),
        Commands::Solvers { probe } => commands::solvers::handle(*probe),
    };

    match result {
        Ok(()) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
