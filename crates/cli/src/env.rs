use std::collections::HashMap;
use std::fs;
use std::path::Path;

use connectors::mongo::MongoSettings;
use tracing::debug;

use crate::error::CliError;

pub const MONGO_URI: &str = "MONGO_URI";
pub const MONGO_USER: &str = "MONGO_USER";
pub const MONGO_PASS: &str = "MONGO_PASS";
pub const MONGO_HOST: &str = "MONGO_HOST";
pub const MONGO_PORT: &str = "MONGO_PORT";

/// Environment variable manager that loads from system and .env files
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
    sensitive_patterns: Vec<String>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self {
            vars: std::env::vars().collect(),
            sensitive_patterns: Self::default_sensitive_patterns(),
        }
    }

    /// Load variables from a .env file. Entries override the process environment.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Overlays the `MONGO_*` variables on the connection settings of a run.
    /// `MONGO_URI` wins over the discrete host/port/credential variables.
    pub fn apply_to(&self, settings: &mut MongoSettings) -> Result<(), CliError> {
        if let Some(uri) = self.get(MONGO_URI) {
            self.trace_applied(MONGO_URI, uri);
            settings.uri = Some(uri.to_string());
            return Ok(());
        }

        if let Some(host) = self.get(MONGO_HOST) {
            self.trace_applied(MONGO_HOST, host);
            settings.host = host.to_string();
        }
        if let Some(port) = self.get(MONGO_PORT) {
            self.trace_applied(MONGO_PORT, port);
            settings.port = port.parse().map_err(|_| {
                CliError::Config(format!("{MONGO_PORT} must be a port number, got '{port}'"))
            })?;
        }
        if let Some(user) = self.get(MONGO_USER) {
            self.trace_applied(MONGO_USER, user);
            settings.username = Some(user.to_string());
        }
        if let Some(pass) = self.get(MONGO_PASS) {
            self.trace_applied(MONGO_PASS, pass);
            settings.password = Some(pass.to_string());
        }
        Ok(())
    }

    fn trace_applied(&self, key: &str, value: &str) {
        if self.is_sensitive(key) {
            debug!(key, value = "***", "Connection setting taken from environment");
        } else {
            debug!(key, value, "Connection setting taken from environment");
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.sensitive_patterns
            .iter()
            .any(|pattern| key.contains(pattern.as_str()))
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Config(format!(
                    "Invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }

        value.to_string()
    }

    /// Default patterns for sensitive variable detection
    fn default_sensitive_patterns() -> Vec<String> {
        ["pass", "secret", "token", "uri", "credential", "auth"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}
