//! Errors the connector can return.
//!
//! [`BackendError`] is what a [`BudgetBackend`] reports; [`ConnectorError`]
//! is what the dispatcher hands back to the host, with the failing
//! `resource.operation` attached to backend failures.
//!
//! [`BudgetBackend`]: crate::BudgetBackend
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Failure reported by a budgeting backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("\"{0}\" not found")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

/// Stage of the session lifecycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Init,
    Download,
    Shutdown,
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Self::Init => "init",
            Self::Download => "download budget",
            Self::Shutdown => "shutdown",
        };
        f.write_str(stage)
    }
}

/// Connector errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConnectorError {
    #[error("Unknown resource \"{0}\"")]
    UnknownResource(String),
    #[error("The operation \"{operation}\" is not supported for resource \"{resource}\"")]
    UnsupportedOperation { resource: String, operation: String },
    #[error("Missing required parameter \"{0}\"")]
    MissingParameter(String),
    #[error("Invalid parameter \"{name}\": {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Missing credential \"{0}\"")]
    MissingCredential(&'static str),
    #[error("Session {stage} failed: {source}")]
    Session {
        stage: SessionStage,
        #[source]
        source: BackendError,
    },
    #[error("{context} failed: {source}")]
    Backend {
        context: String,
        #[source]
        source: BackendError,
    },
    /// The backend answered but the result could not be encoded as JSON.
    #[error("{context} result could not be encoded: {message}")]
    Encode { context: String, message: String },
}

impl ConnectorError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the backend error behind this failure, if any.
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::Session { source, .. } | Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_operation_names_the_pair() {
        let err = ConnectorError::UnsupportedOperation {
            resource: "account".to_string(),
            operation: "sync".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("\"sync\""));
        assert!(message.contains("\"account\""));
    }

    #[test]
    fn backend_failure_carries_context() {
        let err = ConnectorError::Backend {
            context: "account.get".to_string(),
            source: BackendError::NotFound("a1".to_string()),
        };
        assert_eq!(err.to_string(), "account.get failed: \"a1\" not found");
        assert_eq!(err.backend(), Some(&BackendError::NotFound("a1".to_string())));
    }
}
