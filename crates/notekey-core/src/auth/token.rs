use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::CallbackParams;
use crate::error::AuthCallbackError;

/// Token fields as issued by the provider, before expiry is pinned to a time.
///
/// The token endpoint returns this shape as JSON; the implicit flow returns
/// the same names as redirect parameters.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenGrant {
    pub(crate) fn from_callback(params: &CallbackParams) -> Result<Self, AuthCallbackError> {
        let access_token = params.require("access_token")?.to_string();
        let expires_in = params
            .require("expires_in")?
            .parse::<i64>()
            .map_err(|_| {
                AuthCallbackError::Malformed("'expires_in' is not a number of seconds".to_string())
            })?;

        Ok(Self {
            access_token,
            id_token: params.get("id_token").filter(|t| !t.is_empty()).map(str::to_string),
            refresh_token: None,
            token_type: params
                .get("token_type")
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(default_token_type),
            expires_in,
        })
    }
}

/// Claims read from the ID token payload.
///
/// The signature is not checked here; the API gateway's JWT authorizer does
/// that on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Stable user id; the Notes backend keys notes by it.
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "cognito:username")]
    pub username: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl IdentityClaims {
    /// Decode the payload segment of a compact JWT.
    pub fn decode(id_token: &str) -> Result<Self, AuthCallbackError> {
        let malformed = |what: &str| AuthCallbackError::Malformed(format!("id_token {}", what));

        let mut segments = id_token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(malformed("is not a three-part JWT")),
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| malformed("payload is not base64url"))?;
        serde_json::from_slice(&bytes).map_err(|_| malformed("payload is not valid claims JSON"))
    }
}

/// Credentials held while the session is authenticated.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub claims: Option<IdentityClaims>,
}

impl TokenBundle {
    pub(crate) fn from_grant(
        grant: TokenGrant,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthCallbackError> {
        // Provider-supplied: must be non-negative and land within DateTime range
        let expires_at = Some(grant.expires_in)
            .filter(|secs| *secs >= 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthCallbackError::Malformed(format!(
                    "'expires_in' out of range: {}",
                    grant.expires_in
                ))
            })?;
        let claims = grant
            .id_token
            .as_deref()
            .map(IdentityClaims::decode)
            .transpose()?;

        Ok(Self {
            access_token: grant.access_token,
            id_token: grant.id_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            expires_at,
            claims,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }

    /// Token to send as `Authorization: Bearer`.
    ///
    /// Prefers the ID token: JWT authorizers check `aud` against the client
    /// id, and only the ID token carries that claim.
    pub fn bearer(&self) -> &str {
        self.id_token.as_deref().unwrap_or(&self.access_token)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.claims.as_ref().map(|c| c.sub.as_str())
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"<redacted>")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("claims", &self.claims)
            .finish()
    }
}
