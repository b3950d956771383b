//! Backend session handle.
//!
//! A [`Session`] borrows the backend for one execution. It connects lazily
//! on the first request that needs the backend and is released with
//! [`Session::close`], which the node always calls before returning.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{BudgetBackend, ConnectorError, Result, backend::InitConfig, error::SessionStage};

const DEFAULT_DATA_DIR: &str = "data";

/// Credentials of an Actual Budget server.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(alias = "serverURL", alias = "server_url")]
    pub server_url: String,
    pub password: String,
    #[serde(alias = "sync_id")]
    pub sync_id: String,
    /// Only needed for end-to-end encrypted budgets.
    #[serde(default, alias = "encryption_password")]
    pub encryption_password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("server_url", &self.server_url)
            .field("password", &"<redacted>")
            .field("sync_id", &self.sync_id)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(server_url: &str, password: &str, sync_id: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            password: password.to_string(),
            sync_id: sync_id.to_string(),
            encryption_password: None,
        }
    }

    /// Checks that every required field is present. Values are not
    /// otherwise validated.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(ConnectorError::MissingCredential("serverURL"));
        }
        if self.password.is_empty() {
            return Err(ConnectorError::MissingCredential("password"));
        }
        if self.sync_id.trim().is_empty() {
            return Err(ConnectorError::MissingCredential("syncId"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub credentials: Credentials,
    pub data_dir: PathBuf,
}

impl SessionConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

pub struct Session<'b, B: BudgetBackend + ?Sized> {
    backend: &'b mut B,
    config: SessionConfig,
    /// `init` succeeded, so `shutdown` is owed.
    open: bool,
    /// The budget is downloaded and calls can be served.
    ready: bool,
}

impl<'b, B: BudgetBackend + ?Sized> Session<'b, B> {
    pub fn new(backend: &'b mut B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            open: false,
            ready: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Initializes the backend and downloads the budget, once.
    pub async fn ensure_open(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        let credentials = &self.config.credentials;
        if !self.open {
            tracing::info!(
                server_url = %credentials.server_url,
                sync_id = %credentials.sync_id,
                "opening budget session"
            );

            let init = InitConfig {
                server_url: credentials.server_url.clone(),
                password: credentials.password.clone(),
                data_dir: self.config.data_dir.clone(),
            };
            self.backend
                .init(&init)
                .await
                .map_err(|source| ConnectorError::Session {
                    stage: SessionStage::Init,
                    source,
                })?;
            self.open = true;
        }

        self.backend
            .download_budget(
                &credentials.sync_id,
                credentials.encryption_password.as_deref(),
            )
            .await
            .map_err(|source| ConnectorError::Session {
                stage: SessionStage::Download,
                source,
            })?;
        self.ready = true;
        Ok(())
    }

    /// Backend access for dispatch. Callers must have opened the session.
    pub(crate) fn backend(&mut self) -> &mut B {
        &mut *self.backend
    }

    /// Shuts the backend down if the session was opened.
    pub async fn close(mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.ready = false;
        tracing::info!("closing budget session");
        self.backend
            .shutdown()
            .await
            .map_err(|source| ConnectorError::Session {
                stage: SessionStage::Shutdown,
                source,
            })
    }
}

impl<B: BudgetBackend + ?Sized> Drop for Session<'_, B> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("budget session dropped without shutdown");
        }
    }
}
