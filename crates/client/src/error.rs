use connector::BackendError;
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("{status}: {message}")]
    Server { status: StatusCode, message: String },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("no budget session: {0}")]
    NotConnected(&'static str),
}

impl ClientError {
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 | 403 => ClientError::Unauthorized(message),
            404 => ClientError::NotFound(message),
            400 | 422 => ClientError::Invalid(message),
            _ => ClientError::Server { status, message },
        }
    }
}

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unauthorized(message) => BackendError::Unauthorized(message),
            ClientError::NotFound(message) => BackendError::NotFound(message),
            ClientError::Invalid(message) => BackendError::Invalid(message),
            ClientError::Server { status, message } => BackendError::Server {
                status: status.as_u16(),
                message,
            },
            ClientError::Transport(err) => BackendError::Transport(err.to_string()),
            err @ (ClientError::InvalidUrl(_) | ClientError::NotConnected(_)) => {
                BackendError::Invalid(err.to_string())
            }
        }
    }
}
