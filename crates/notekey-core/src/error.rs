use thiserror::Error;

use crate::api::ApiError;

/// Configuration could not be turned into a usable `Configuration`.
///
/// Raised only at construction time. The caller cannot proceed without a
/// valid configuration.
#[derive(Error, Debug)]
pub enum InvalidConfig {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field must not be empty: {0}")]
    EmptyField(&'static str),

    #[error("Invalid URL in {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("{0} must not end with '/'")]
    TrailingSlash(&'static str),

    #[error("Invalid scope token: {0:?}")]
    InvalidScope(String),

    #[error("Unsupported response type: {0} (expected \"token\" or \"code\")")]
    UnsupportedResponseType(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not find config directory")]
    NoConfigDir,
}

/// The redirect back from the identity provider could not be turned into a
/// session. Recoverable: the caller may start over with `begin_login`.
#[derive(Error, Debug)]
pub enum AuthCallbackError {
    #[error("No login is pending")]
    NoPendingLogin,

    #[error("Identity provider denied the request: {error}{}", .description.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Callback state does not match the pending login")]
    StateMismatch,

    #[error("ID token nonce does not match the pending login")]
    NonceMismatch,

    #[error("Pending login is too old to resume")]
    PendingExpired,

    #[error("Malformed callback: {0}")]
    Malformed(String),

    #[error("Token exchange failed: {0}")]
    Exchange(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Session-level conditions reported when the token is read.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session token has expired - log in again")]
    TokenExpired,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Already authenticated - log out first")]
    AlreadyAuthenticated,
}
