use thiserror::Error;

/// Errors raised while loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or does not match the expected shape.
    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is present but unusable.
    #[error("Invalid setting `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    /// One or more settings failed validation.
    #[error("Settings validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// A required value is missing.
    #[error("Missing required setting: {0}")]
    Missing(String),
}

impl SettingsError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SettingsError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
