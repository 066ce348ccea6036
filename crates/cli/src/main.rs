use crate::{
    env::EnvManager,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::{Commands, ConfigArgs};
use connectors::{mongo::MongoConnector, mongo::MongoSettings, store::Connector};
use engine_config::settings::{
    ConfigOverrides, RunConfig, validated::ValidatedConfig, validator::SettingsValidator,
};
use engine_core::connection::PoolSettings;
use engine_processing::dedupe;
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "docmaint",
    version,
    about = "Batch-parallel maintenance of MongoDB documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match execute(cli.command, &shutdown).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "docmaint failed");
            if shutdown.is_shutdown_requested() {
                ExitCode::ShutdownRequested
            } else {
                ExitCode::GeneralError
            }
        }
    };
    std::process::exit(code.as_i32());
}

async fn execute(command: Commands, shutdown: &ShutdownCoordinator) -> Result<ExitCode, CliError> {
    match command {
        Commands::Run {
            target,
            overrides,
            json,
        } => {
            let config = load_config(&target, &overrides.into())?;
            if config.is_destructive() && !config.dry_run {
                warn!(
                    op = config.mutation.kind(),
                    source = %config.source,
                    "Destructive operation, consider a --dry-run first"
                );
            }
            let fail_on_error = config.fail_on_error;
            let connector = mongo_connector(config.connection.clone());

            let outcome = engine_runtime::run(config, connector, shutdown.cancel_token()).await?;
            output::print_outcome(&outcome, json)?;

            if shutdown.is_shutdown_requested() {
                Ok(ExitCode::ShutdownRequested)
            } else if fail_on_error && outcome.report.has_errors() {
                Ok(ExitCode::PartialFailure)
            } else {
                Ok(ExitCode::Success)
            }
        }
        Commands::Count { target, id_file } => {
            let overrides = ConfigOverrides {
                id_file,
                ..Default::default()
            };
            let config = load_config(&target, &overrides)?;
            let connector = mongo_connector(config.connection.clone());
            let count = engine_runtime::count(&config, connector).await?;
            output::print_count(&count)?;
            Ok(ExitCode::Success)
        }
        Commands::Dedupe {
            input,
            field,
            output_dir,
        } => {
            info!(input = %input.display(), field = %field, "Analysing duplicates");
            let documents = dedupe::load_documents(&input)?;
            let analysis = dedupe::analyze(&documents, &field);
            let written = analysis.write_outputs(&output_dir)?;
            output::print_dedupe(&analysis, &written);
            Ok(ExitCode::Success)
        }
        Commands::TestConn { uri, env_file } => {
            let mut settings = MongoSettings::default();
            load_env(env_file.as_deref())?.apply_to(&mut settings)?;
            if let Some(uri) = uri {
                settings.uri = Some(uri);
            }

            let pool = PoolSettings {
                max_sessions: 1,
                ..Default::default()
            };
            let endpoint = engine_runtime::test_connection(mongo_connector(settings), pool).await?;
            println!("Connection to {endpoint} succeeded");
            Ok(ExitCode::Success)
        }
    }
}

fn load_env(env_file: Option<&Path>) -> Result<EnvManager, CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = env_file {
        env.load_from_file(path)?;
    }
    Ok(env)
}

/// Reads the run file, applies command-line and environment overrides and
/// validates the result.
fn load_config(args: &ConfigArgs, overrides: &ConfigOverrides) -> Result<ValidatedConfig, CliError> {
    let mut config = RunConfig::from_file(&args.config)?;
    config.apply_overrides(overrides);
    load_env(args.env_file.as_deref())?.apply_to(&mut config.connection)?;

    let validated = SettingsValidator::new(&config).validate()?;
    info!(
        config = %args.config.display(),
        endpoint = %validated.connection.describe(),
        "Run configuration loaded"
    );
    Ok(validated)
}

fn mongo_connector(settings: MongoSettings) -> Arc<dyn Connector> {
    Arc::new(MongoConnector::new(settings))
}
