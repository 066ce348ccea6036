use engine_config::settings::error::SettingsError;
use engine_processing::error::DedupeError;
use engine_runtime::error::RunError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid run configuration: {0}")]
    Settings(#[from] SettingsError),

    #[error("Run failed: {0}")]
    Run(#[from] RunError),

    #[error("Duplicate analysis failed: {0}")]
    Dedupe(#[from] DedupeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}
