//! Notekey core library.
//!
//! Typed configuration loading and hosted-login session management for the
//! Notes web front end:
//!
//! - `config`: validated, immutable `Configuration` built by `ConfigStore`
//! - `auth`: `SessionManager` driving the redirect-based login handshake
//! - `api`: token-endpoint exchange and bearer-authorized API requests
//! - `error`: configuration, callback and session error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;

pub use api::{ApiClient, ApiError, TokenClient};
pub use auth::{
    CallbackParams, IdentityClaims, Navigation, PendingLogin, SessionManager, SessionState,
    TokenBundle,
};
pub use config::{ConfigStore, Configuration, RawConfig, ResponseType, Scopes};
pub use error::{AuthCallbackError, InvalidConfig, SessionError};
