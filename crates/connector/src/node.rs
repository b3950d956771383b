//! Node execution: the entry point the host platform calls.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    BudgetBackend, Credentials, Parameters, Request, Result, Session, SessionConfig, dispatch,
};

/// One output item, `{"json": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub json: Value,
}

impl ResultRecord {
    pub fn data(value: Value) -> Self {
        Self {
            json: json!({ "data": value }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            json: json!({ "error": message.into() }),
        }
    }

    /// The `data` payload, if this record is not an error record.
    pub fn payload(&self) -> Option<&Value> {
        self.json.get("data")
    }
}

/// Actual Budget node.
///
/// Holds the resolved credentials; every [`execute`](Node::execute) runs
/// inside its own backend session.
#[derive(Debug, Clone)]
pub struct Node {
    config: SessionConfig,
    continue_on_fail: bool,
}

impl Node {
    pub fn builder() -> NodeBuilder {
        NodeBuilder::default()
    }

    /// Runs the operation selected by `parameters` once per input item.
    ///
    /// The request is validated before the backend is touched. The session is
    /// opened at most once and always shut down before returning; an
    /// operation error takes precedence over a shutdown error.
    pub async fn execute<B: BudgetBackend + ?Sized>(
        &self,
        backend: &mut B,
        parameters: &Parameters,
        item_count: usize,
    ) -> Result<Vec<ResultRecord>> {
        let request = Request::from_parameters(parameters)?;
        if item_count == 0 {
            return Ok(Vec::new());
        }

        let mut session = Session::new(backend, self.config.clone());
        let outcome = self.run_items(&mut session, &request, item_count).await;
        let closed = session.close().await;

        match (outcome, closed) {
            (Ok(records), Ok(())) => Ok(records),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(shutdown)) => {
                tracing::warn!("shutdown after failed operation also failed: {shutdown}");
                Err(err)
            }
        }
    }

    async fn run_items<B: BudgetBackend + ?Sized>(
        &self,
        session: &mut Session<'_, B>,
        request: &Request,
        item_count: usize,
    ) -> Result<Vec<ResultRecord>> {
        let mut records = Vec::with_capacity(item_count);
        for item in 0..item_count {
            match dispatch(session, request).await {
                Ok(value) => records.push(ResultRecord::data(value)),
                Err(err) if self.continue_on_fail => {
                    tracing::warn!(item, "continuing after failure: {err}");
                    records.push(ResultRecord::error(err.to_string()));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(records)
    }
}

#[derive(Default, Debug)]
pub struct NodeBuilder {
    credentials: Credentials,
    data_dir: Option<PathBuf>,
    continue_on_fail: bool,
}

impl NodeBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> NodeBuilder {
        self.credentials = credentials;
        self
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> NodeBuilder {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Turn failing items into `{"error": ...}` records instead of aborting.
    pub fn continue_on_fail(mut self, continue_on_fail: bool) -> NodeBuilder {
        self.continue_on_fail = continue_on_fail;
        self
    }

    pub fn build(self) -> Result<Node> {
        self.credentials.validate()?;
        let mut config = SessionConfig::new(self.credentials);
        if let Some(data_dir) = self.data_dir {
            config = config.data_dir(data_dir);
        }
        Ok(Node {
            config,
            continue_on_fail: self.continue_on_fail,
        })
    }
}
