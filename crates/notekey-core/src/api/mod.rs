//! Network side of the client.
//!
//! - `TokenClient` exchanges an authorization code at the identity
//!   provider's token endpoint (code flow only)
//! - `ApiClient` builds requests against the configured API base URL with
//!   the session's bearer token attached
//!
//! Neither retries; a failed request is reported once to the caller.

pub mod client;
pub mod error;
pub mod token;

pub use client::ApiClient;
pub use error::ApiError;
pub use token::TokenClient;

use std::time::Duration;

use reqwest::Client;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

fn http_client() -> Result<Client, ApiError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?)
}
