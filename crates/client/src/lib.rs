//! HTTP backend for the Actual Budget connector.
//!
//! [`HttpBackend`] implements [`connector::BudgetBackend`] against an HTTP
//! bridge that fronts an Actual server, and [`check_credentials`] checks a
//! server URL and password without opening a budget.

mod error;
mod http;

use connector::Credentials;
use reqwest::Client;

pub use error::ClientError;
pub use http::HttpBackend;

/// Logs in with `credentials` and discards the token.
pub async fn check_credentials(credentials: &Credentials) -> Result<(), ClientError> {
    let server = http::parse_server_url(&credentials.server_url)?;
    http::login(&Client::new(), &server, &credentials.password).await?;
    tracing::info!(server_url = %server, "credentials accepted");
    Ok(())
}
