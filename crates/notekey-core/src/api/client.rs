//! Requests against the configured API base URL.
//!
//! `ApiClient` only composes URLs and attaches the session's bearer token;
//! what the caller does with the resulting request is up to the caller.

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder};
use url::Url;

use super::{http_client, ApiError};
use crate::auth::SessionManager;
use crate::config::Configuration;

/// API client bound to `api_base_url`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<Configuration>,
    client: Client,
}

impl ApiClient {
    pub fn new(config: Arc<Configuration>) -> Result<Self, ApiError> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    /// `{api_base_url}/{path}` with exactly one `/` between the two.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let url = format!(
            "{}/{}",
            self.config.api_base_url(),
            path.trim_start_matches('/')
        );
        Url::parse(&url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", url, e)))
    }

    /// Request builder with `Authorization: Bearer` taken from the session.
    ///
    /// An expired token is noticed here and moves the session to `Expired`.
    pub fn authorized(
        &self,
        method: Method,
        path: &str,
        session: &mut SessionManager,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(path)?;
        let token = session.token()?;
        Ok(self.client.request(method, url).bearer_auth(token.bearer()))
    }
}
