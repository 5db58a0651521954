//! Authorization-code exchange against the identity provider.

use std::sync::Arc;

use reqwest::{Client, Request};
use tracing::debug;

use super::{http_client, ApiError};
use crate::auth::TokenGrant;
use crate::config::Configuration;

/// Client for the provider's token endpoint.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct TokenClient {
    config: Arc<Configuration>,
    client: Client,
}

impl TokenClient {
    pub fn new(config: Arc<Configuration>) -> Result<Self, ApiError> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    /// Exchange an authorization code plus its PKCE verifier for tokens.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant, ApiError> {
        let request = self.exchange_request(code, verifier)?;
        debug!(url = %request.url(), "Exchanging authorization code");

        let response = self.client.execute(request).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("token response: {}", e)))
    }

    fn exchange_request(&self, code: &str, verifier: &str) -> Result<Request, ApiError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri()),
            ("code_verifier", verifier),
        ];

        Ok(self
            .client
            .post(self.config.token_endpoint().clone())
            .form(&params)
            .build()?)
    }
}
