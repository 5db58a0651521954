//! Authentication module for the hosted-login handshake.
//!
//! This module provides:
//! - `SessionManager`: owns the session and drives its state transitions
//! - `CallbackParams`: parameters delivered on the redirect back from the provider
//! - `TokenBundle`: credentials held while authenticated, with lazy expiry
//!
//! Nothing here is persisted; the session lives as long as the process.

pub mod callback;
pub mod pkce;
pub mod session;
pub mod token;

pub use callback::CallbackParams;
pub use session::{Navigation, PendingLogin, SessionManager, SessionState};
pub use token::{IdentityClaims, TokenBundle, TokenGrant};
