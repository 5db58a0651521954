use std::collections::HashMap;

use url::{form_urlencoded, Url};

use crate::error::AuthCallbackError;

/// Parameters the identity provider delivers on the redirect back.
///
/// The implicit flow puts tokens in the URL fragment and the code flow puts
/// the code in the query string. Errors can show up in either, so both are
/// merged; on a clash the fragment wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    params: HashMap<String, String>,
}

impl CallbackParams {
    /// Parse the full URL the browser was redirected to.
    pub fn from_redirect_url(redirect: &str) -> Result<Self, AuthCallbackError> {
        let url = Url::parse(redirect.trim())
            .map_err(|e| AuthCallbackError::Malformed(format!("invalid redirect URL: {}", e)))?;

        let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        if let Some(fragment) = url.fragment() {
            params.extend(form_urlencoded::parse(fragment.as_bytes()).into_owned());
        }

        Ok(Self { params })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Like `get`, but a missing or empty value is a malformed callback.
    pub(crate) fn require(&self, key: &str) -> Result<&str, AuthCallbackError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthCallbackError::Malformed(format!("missing '{}' parameter", key)))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The provider's `error`/`error_description` pair, if it sent one.
    pub(crate) fn provider_error(&self) -> Option<AuthCallbackError> {
        self.get("error").map(|error| AuthCallbackError::ProviderDenied {
            error: error.to_string(),
            description: self
                .get("error_description")
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }
}
