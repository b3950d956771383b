use std::path::PathBuf;

use actual_client::HttpBackend;
use connector::Credentials;
use serde::Deserialize;

use crate::{cli::Cli, error::Result};

const DEFAULT_CONFIG_PATH: &str = "config/connector.toml";
const ENV_PREFIX: &str = "ACTUAL";
const OFFLINE_PLACEHOLDER: &str = "offline";

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_url: String,
    pub password: String,
    pub sync_id: String,
    pub encryption_password: Option<String>,
    /// Budget API base when the bridge is not served from `server_url`.
    pub bridge_url: Option<String>,
    pub bridge_api_key: Option<String>,
    pub data_dir: PathBuf,
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5006".to_string(),
            password: String::new(),
            sync_id: String::new(),
            encryption_password: None,
            bridge_url: None,
            bridge_api_key: None,
            data_dir: PathBuf::from("data"),
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn credentials(&self) -> Credentials {
        let mut credentials = Credentials::new(&self.server_url, &self.password, &self.sync_id);
        credentials.encryption_password = self.encryption_password.clone();
        credentials
    }

    pub fn http_backend(&self) -> Result<HttpBackend> {
        let backend = HttpBackend::new();
        match &self.bridge_url {
            Some(url) => Ok(backend.bridge(url, self.bridge_api_key.as_deref())?),
            None => Ok(backend),
        }
    }

    /// Credentials for the in-memory budget, which accepts anything.
    pub fn offline_credentials(&self) -> Credentials {
        let mut credentials = self.credentials();
        for field in [&mut credentials.password, &mut credentials.sync_id] {
            if field.is_empty() {
                *field = OFFLINE_PLACEHOLDER.to_string();
            }
        }
        credentials
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(server_url) = &cli.server_url {
            self.server_url = server_url.clone();
        }
        if let Some(sync_id) = &cli.sync_id {
            self.sync_id = sync_id.clone();
        }
        if let Some(data_dir) = &cli.data_dir {
            self.data_dir = data_dir.clone();
        }
        if let Some(level) = &cli.level {
            self.level = level.clone();
        }
    }
}

/// Config file, then `ACTUAL_*` environment variables, then CLI flags.
pub fn load(cli: &Cli) -> Result<AppConfig> {
    let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut builder = config::Config::builder();
    builder = builder.add_source(config::File::with_name(config_path).required(false));
    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));
    let mut settings: AppConfig = builder.build()?.try_deserialize()?;

    settings.apply(cli);
    Ok(settings)
}
