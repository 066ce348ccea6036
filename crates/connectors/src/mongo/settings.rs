use crate::error::StoreError;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_APP_NAME: &str = "docmaint";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Endpoint and credentials of the database a run works against.
///
/// Either `uri` is set (a full `mongodb://` or `mongodb+srv://` connection
/// string) or the discrete host/port/credential fields are used.
#[derive(Clone, Serialize, Deserialize)]
pub struct MongoSettings {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_source: Option<String>,
    #[serde(default)]
    pub max_pool_size: Option<u32>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub app_name: Option<String>,
}

impl Default for MongoSettings {
    fn default() -> Self {
        MongoSettings {
            uri: None,
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            auth_source: None,
            max_pool_size: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            app_name: None,
        }
    }
}

impl std::fmt::Debug for MongoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoSettings")
            .field("endpoint", &self.describe())
            .field("max_pool_size", &self.max_pool_size)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl MongoSettings {
    /// Endpoint with credentials stripped, for logs and reports.
    pub fn describe(&self) -> String {
        match &self.uri {
            Some(uri) => redact_uri(uri),
            None => match &self.username {
                Some(user) => format!("mongodb://{user}:***@{}:{}", self.host, self.port),
                None => format!("mongodb://{}:{}", self.host, self.port),
            },
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub async fn client_options(&self) -> Result<ClientOptions, StoreError> {
        let mut options = match &self.uri {
            Some(uri) => ClientOptions::parse(uri.as_str())
                .await
                .map_err(|e| StoreError::Invalid(format!("invalid connection string: {e}")))?,
            None => {
                let mut options = ClientOptions::default();
                options.hosts = vec![ServerAddress::Tcp {
                    host: self.host.clone(),
                    port: Some(self.port),
                }];
                options
            }
        };

        if options.credential.is_none()
            && let Some(username) = &self.username
        {
            let mut credential = Credential::default();
            credential.username = Some(username.clone());
            credential.password = self.password.clone();
            credential.source = self.auth_source.clone();
            options.credential = Some(credential);
        }

        if self.max_pool_size.is_some() {
            options.max_pool_size = self.max_pool_size;
        }
        options.connect_timeout = Some(self.connect_timeout());
        options.server_selection_timeout = Some(self.connect_timeout());
        if options.app_name.is_none() {
            options.app_name = Some(
                self.app_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            );
        }

        Ok(options)
    }
}

fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    match rest.rsplit_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        None => uri.to_string(),
    }
}
