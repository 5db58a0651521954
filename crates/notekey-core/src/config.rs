//! Application configuration loading and validation.
//!
//! A deployment supplies a raw configuration record mirroring the two objects
//! the front end reads: the Notes API settings and the hosted-login settings.
//! `ConfigStore::load` validates it once into an immutable `Configuration`
//! that is shared (as `Arc<Configuration>`) with everything that needs it.
//!
//! The default file location is `~/.config/notekey/config.json`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::InvalidConfig;

/// Application name used for the config directory path
pub const APP_NAME: &str = "notekey";

/// Config file name
const CONFIG_FILE: &str = "config.json";

// Environment variable names read by `RawConfig::from_env`
const ENV_API_BASE_URL: &str = "NOTES_API_BASE_URL";
const ENV_DOMAIN: &str = "COGNITO_DOMAIN";
const ENV_CLIENT_ID: &str = "COGNITO_CLIENT_ID";
const ENV_REDIRECT_URI: &str = "COGNITO_REDIRECT_URI";
const ENV_SCOPE: &str = "COGNITO_SCOPE";
const ENV_LOGOUT_URI: &str = "COGNITO_LOGOUT_URI";
const ENV_RESPONSE_TYPE: &str = "COGNITO_RESPONSE_TYPE";

// ============================================================================
// Raw record
// ============================================================================

/// Unvalidated configuration as handed over by the deployment.
///
/// Every field is optional here so that `ConfigStore::load` can name the one
/// that is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub notes_api: RawApiConfig,
    #[serde(default)]
    pub cognito: RawIdentityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawApiConfig {
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIdentityConfig {
    pub domain: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<RawScope>,
    pub logout_uri: Option<String>,
    pub response_type: Option<String>,
}

/// Scopes as written in the raw record: `"email openid phone"` or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScope {
    Delimited(String),
    List(Vec<String>),
}

impl RawScope {
    fn tokens(&self) -> Vec<&str> {
        match self {
            RawScope::Delimited(s) => s.split_whitespace().collect(),
            RawScope::List(items) => items.iter().map(|s| s.trim()).collect(),
        }
    }
}

impl RawConfig {
    pub fn from_json_str(json: &str) -> Result<Self, InvalidConfig> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, InvalidConfig> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Read the record from `NOTES_API_BASE_URL` and the `COGNITO_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            notes_api: RawApiConfig {
                api_base_url: lookup(ENV_API_BASE_URL),
            },
            cognito: RawIdentityConfig {
                domain: lookup(ENV_DOMAIN),
                client_id: lookup(ENV_CLIENT_ID),
                redirect_uri: lookup(ENV_REDIRECT_URI),
                scope: lookup(ENV_SCOPE).map(RawScope::Delimited),
                logout_uri: lookup(ENV_LOGOUT_URI),
                response_type: lookup(ENV_RESPONSE_TYPE),
            },
        }
    }
}

// ============================================================================
// Validated values
// ============================================================================

/// OAuth response type requested from the hosted login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Implicit flow: tokens come back in the redirect fragment.
    #[default]
    Token,
    /// Authorization code flow with PKCE; the code is exchanged at the token endpoint.
    Code,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Token => "token",
            ResponseType::Code => "code",
        }
    }
}

impl FromStr for ResponseType {
    type Err = InvalidConfig;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(ResponseType::Token),
            "code" => Ok(ResponseType::Code),
            other => Err(InvalidConfig::UnsupportedResponseType(other.to_string())),
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of requested scopes.
///
/// Duplicates are collapsed and first-seen order is kept so the generated
/// login URL is reproducible. Equality ignores order.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct Scopes(Vec<String>);

impl Scopes {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scopes: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.into();
            if !scopes.contains(&token) {
                scopes.push(token);
            }
        }
        Self(scopes)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space-delimited form used in the `scope` query parameter.
    pub fn to_param(&self) -> String {
        self.0.join(" ")
    }
}

impl PartialEq for Scopes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|s| other.contains(s))
    }
}

/// Validated, immutable client configuration.
///
/// `redirect_uri` must match a value registered with the identity provider
/// byte for byte. Only the provider can check that, so it is kept exactly as
/// supplied (minus surrounding whitespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    api_base_url: String,
    identity_domain: String,
    client_id: String,
    redirect_uri: String,
    logout_uri: String,
    scopes: Scopes,
    response_type: ResponseType,
    authorize_endpoint: Url,
    token_endpoint: Url,
    logout_endpoint: Url,
}

impl Configuration {
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn identity_domain(&self) -> &str {
        &self.identity_domain
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Where the provider sends the user after sign-out (defaults to `redirect_uri`).
    pub fn logout_uri(&self) -> &str {
        &self.logout_uri
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// Hosted login page: `{identity_domain}/oauth2/authorize`
    pub fn authorize_endpoint(&self) -> &Url {
        &self.authorize_endpoint
    }

    /// Code exchange endpoint: `{identity_domain}/oauth2/token`
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    /// Hosted sign-out: `{identity_domain}/logout`
    pub fn logout_endpoint(&self) -> &Url {
        &self.logout_endpoint
    }
}

// ============================================================================
// ConfigStore
// ============================================================================

/// Loads and validates configuration records.
pub struct ConfigStore;

impl ConfigStore {
    /// Validate a raw record into a `Configuration`.
    ///
    /// `apiBaseUrl` ending in `/` is rejected. A trailing `/` on the identity
    /// domain is dropped since endpoint paths are appended to it.
    pub fn load(raw: RawConfig) -> Result<Configuration, InvalidConfig> {
        let RawConfig { notes_api, cognito } = raw;

        let api_base_url = required("apiBaseUrl", notes_api.api_base_url)?;
        parse_base("apiBaseUrl", &api_base_url)?;
        if api_base_url.ends_with('/') {
            return Err(InvalidConfig::TrailingSlash("apiBaseUrl"));
        }

        let domain = required("domain", cognito.domain)?;
        let identity_domain = domain.trim_end_matches('/').to_string();
        parse_base("domain", &identity_domain)?;

        let client_id = required("clientId", cognito.client_id)?;

        let redirect_uri = required("redirectUri", cognito.redirect_uri)?;
        parse_absolute("redirectUri", &redirect_uri)?;

        let logout_uri = match optional(cognito.logout_uri) {
            Some(uri) => {
                parse_absolute("logoutUri", &uri)?;
                uri
            }
            None => redirect_uri.clone(),
        };

        let scope = cognito.scope.ok_or(InvalidConfig::MissingField("scope"))?;
        let tokens = scope.tokens();
        if let Some(bad) = tokens.iter().find(|t| !is_scope_token(t)) {
            return Err(InvalidConfig::InvalidScope((*bad).to_string()));
        }
        let scopes = Scopes::new(tokens);
        if scopes.is_empty() {
            return Err(InvalidConfig::EmptyField("scope"));
        }

        let response_type = match optional(cognito.response_type) {
            Some(value) => value.parse()?,
            None => ResponseType::default(),
        };

        let endpoint = |path: &str| parse_absolute("domain", &format!("{identity_domain}{path}"));
        let authorize_endpoint = endpoint("/oauth2/authorize")?;
        let token_endpoint = endpoint("/oauth2/token")?;
        let logout_endpoint = endpoint("/logout")?;

        debug!(
            api_base_url = %api_base_url,
            identity_domain = %identity_domain,
            response_type = %response_type,
            scopes = %scopes.to_param(),
            "Configuration loaded"
        );

        Ok(Configuration {
            api_base_url,
            identity_domain,
            client_id,
            redirect_uri,
            logout_uri,
            scopes,
            response_type,
            authorize_endpoint,
            token_endpoint,
            logout_endpoint,
        })
    }

    /// Read and validate a JSON configuration file.
    pub fn load_file(path: &Path) -> Result<Configuration, InvalidConfig> {
        Self::load(RawConfig::from_file(path)?)
    }

    /// `<config dir>/notekey/config.json`
    pub fn default_path() -> Result<PathBuf, InvalidConfig> {
        let config_dir = dirs::config_dir().ok_or(InvalidConfig::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &'static str, value: Option<String>) -> Result<String, InvalidConfig> {
    let value = value.ok_or(InvalidConfig::MissingField(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InvalidConfig::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

/// Absolute http(s) URL with a host.
fn parse_absolute(field: &'static str, value: &str) -> Result<Url, InvalidConfig> {
    let invalid = |reason: String| InvalidConfig::InvalidUrl { field, reason };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Absolute URL that paths get appended to, so no query or fragment.
fn parse_base(field: &'static str, value: &str) -> Result<Url, InvalidConfig> {
    let url = parse_absolute(field, value)?;
    if url.query().is_some() || url.fragment().is_some() {
        return Err(InvalidConfig::InvalidUrl {
            field,
            reason: "must not contain a query or fragment".to_string(),
        });
    }
    Ok(url)
}

/// RFC 6749 scope-token characters: printable ASCII except space, `"` and `\`.
fn is_scope_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b == 0x21 || (0x23..=0x5B).contains(&b) || (0x5D..=0x7E).contains(&b))
}
