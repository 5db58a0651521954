use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::pkce;
use super::{CallbackParams, TokenBundle, TokenGrant};
use crate::api::TokenClient;
use crate::config::{Configuration, ResponseType};
use crate::error::{AuthCallbackError, SessionError};

/// A pending login older than this cannot be resumed.
const PENDING_LOGIN_TTL_MINUTES: i64 = 10;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    Unauthenticated,
    PendingRedirect,
    Authenticated,
    Expired,
}

/// Values generated by `begin_login` that the callback is checked against.
///
/// Serializable so a caller that needs to survive a reload can stash it in
/// short-lived storage and hand it back through `SessionManager::resume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    /// PKCE verifier, present only for the code flow.
    pub code_verifier: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl PendingLogin {
    fn generate(response_type: ResponseType) -> Self {
        Self {
            state: pkce::generate_state(),
            nonce: pkce::generate_nonce(),
            code_verifier: match response_type {
                ResponseType::Code => Some(pkce::generate_code_verifier()),
                ResponseType::Token => None,
            },
            started_at: Utc::now(),
        }
    }

    fn is_stale(&self) -> bool {
        Utc::now() - self.started_at > Duration::minutes(PENDING_LOGIN_TTL_MINUTES)
    }
}

/// Where the caller must send the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Hosted login page.
    Login(Url),
    /// Hosted sign-out endpoint.
    Logout(Url),
}

impl Navigation {
    pub fn url(&self) -> &Url {
        match self {
            Navigation::Login(url) | Navigation::Logout(url) => url,
        }
    }
}

enum Session {
    Unauthenticated,
    PendingRedirect(PendingLogin),
    Authenticated(TokenBundle),
    Expired,
}

/// Owns the single session of a running client and drives its transitions.
///
/// ```text
/// Unauthenticated --begin_login--> PendingRedirect --complete_login--> Authenticated
///        ^                              |                                   |
///        +------- callback error -------+                           expiry (lazy)
///        +------------ logout (any state)                                   v
///                                  PendingRedirect <--begin_login------- Expired
/// ```
pub struct SessionManager {
    config: Arc<Configuration>,
    session: Session,
}

impl SessionManager {
    pub fn new(config: Arc<Configuration>) -> Self {
        Self {
            config,
            session: Session::Unauthenticated,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Current state. An authenticated session past its expiry becomes `Expired` here.
    pub fn state(&mut self) -> SessionState {
        self.check_expiry();
        match self.session {
            Session::Unauthenticated => SessionState::Unauthenticated,
            Session::PendingRedirect(_) => SessionState::PendingRedirect,
            Session::Authenticated(_) => SessionState::Authenticated,
            Session::Expired => SessionState::Expired,
        }
    }

    /// The token bundle, if the session is authenticated and not yet expired.
    pub fn token(&mut self) -> Result<&TokenBundle, SessionError> {
        self.check_expiry();
        match &self.session {
            Session::Authenticated(token) => Ok(token),
            Session::Expired => Err(SessionError::TokenExpired),
            Session::Unauthenticated | Session::PendingRedirect(_) => {
                Err(SessionError::NotAuthenticated)
            }
        }
    }

    pub fn pending_login(&self) -> Option<&PendingLogin> {
        match &self.session {
            Session::PendingRedirect(pending) => Some(pending),
            _ => None,
        }
    }

    /// Start a login and return the hosted-login URL to navigate to.
    ///
    /// From `PendingRedirect` the previous attempt is discarded.
    pub fn begin_login(&mut self) -> Result<Navigation, SessionError> {
        self.check_expiry();
        if let Session::Authenticated(_) = self.session {
            return Err(SessionError::AlreadyAuthenticated);
        }

        let pending = PendingLogin::generate(self.config.response_type());
        let url = self.login_url(&pending);
        self.session = Session::PendingRedirect(pending);

        info!(response_type = %self.config.response_type(), "Login started");
        Ok(Navigation::Login(url))
    }

    /// Re-enter `PendingRedirect` with a record saved before a reload.
    ///
    /// A live session is never replaced; like `begin_login`, this requires
    /// logging out first.
    pub fn resume(&mut self, pending: PendingLogin) -> Result<(), AuthCallbackError> {
        self.check_expiry();
        if let Session::Authenticated(_) = self.session {
            return Err(SessionError::AlreadyAuthenticated.into());
        }
        if pending.is_stale() {
            return Err(AuthCallbackError::PendingExpired);
        }
        let is_code_flow = self.config.response_type() == ResponseType::Code;
        if pending.code_verifier.is_some() != is_code_flow {
            return Err(AuthCallbackError::Malformed(
                "pending login was started for a different response type".to_string(),
            ));
        }

        debug!("Pending login resumed");
        self.session = Session::PendingRedirect(pending);
        Ok(())
    }

    /// Finish an implicit-flow login from the redirect parameters.
    ///
    /// Any failure leaves the session `Unauthenticated`; nothing is retried.
    pub fn complete_login(&mut self, params: &CallbackParams) -> Result<(), AuthCallbackError> {
        let pending = self.take_pending(params)?;
        if self.config.response_type() != ResponseType::Token {
            return Err(AuthCallbackError::Malformed(
                "client is configured for the code flow; use complete_login_with_code".to_string(),
            ));
        }

        let grant = TokenGrant::from_callback(params)?;
        self.authenticate(grant, &pending)
    }

    /// Finish a code-flow login by exchanging the code at the token endpoint.
    pub async fn complete_login_with_code(
        &mut self,
        params: &CallbackParams,
        client: &TokenClient,
    ) -> Result<(), AuthCallbackError> {
        let pending = self.take_pending(params)?;
        if self.config.response_type() != ResponseType::Code {
            return Err(AuthCallbackError::Malformed(
                "client is configured for the implicit flow; use complete_login".to_string(),
            ));
        }

        let code = params.require("code")?;
        let verifier = pending.code_verifier.as_deref().ok_or_else(|| {
            AuthCallbackError::Malformed("pending login has no PKCE verifier".to_string())
        })?;

        let grant = client.exchange_code(code, verifier).await?;
        self.authenticate(grant, &pending)
    }

    /// Drop all credentials and return the hosted sign-out URL. Valid from any state.
    pub fn logout(&mut self) -> Navigation {
        self.session = Session::Unauthenticated;
        info!("Logged out");

        let mut url = self.config.logout_endpoint().clone();
        url.query_pairs_mut()
            .append_pair("client_id", self.config.client_id())
            .append_pair("logout_uri", self.config.logout_uri());
        Navigation::Logout(url)
    }

    fn login_url(&self, pending: &PendingLogin) -> Url {
        let config = &self.config;
        let mut url = config.authorize_endpoint().clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", config.response_type().as_str())
                .append_pair("client_id", config.client_id())
                .append_pair("redirect_uri", config.redirect_uri())
                .append_pair("scope", &config.scopes().to_param())
                .append_pair("state", &pending.state)
                .append_pair("nonce", &pending.nonce);
            if let Some(ref verifier) = pending.code_verifier {
                query
                    .append_pair("code_challenge", &pkce::code_challenge(verifier))
                    .append_pair("code_challenge_method", "S256");
            }
        }
        url
    }

    /// Leave `PendingRedirect` and check the callback against it.
    ///
    /// Outside `PendingRedirect` the session is left untouched.
    fn take_pending(&mut self, params: &CallbackParams) -> Result<PendingLogin, AuthCallbackError> {
        let pending = match std::mem::replace(&mut self.session, Session::Unauthenticated) {
            Session::PendingRedirect(pending) => pending,
            other => {
                self.session = other;
                return Err(AuthCallbackError::NoPendingLogin);
            }
        };

        if let Some(denied) = params.provider_error() {
            return Err(denied);
        }
        if params.get("state") != Some(pending.state.as_str()) {
            return Err(AuthCallbackError::StateMismatch);
        }
        Ok(pending)
    }

    fn authenticate(
        &mut self,
        grant: TokenGrant,
        pending: &PendingLogin,
    ) -> Result<(), AuthCallbackError> {
        let bundle = TokenBundle::from_grant(grant, Utc::now())?;

        if let Some(ref claims) = bundle.claims {
            if claims.nonce.as_deref() != Some(pending.nonce.as_str()) {
                return Err(AuthCallbackError::NonceMismatch);
            }
        } else if self.config.scopes().contains("openid") {
            return Err(AuthCallbackError::Malformed(
                "openid scope requested but no id_token returned".to_string(),
            ));
        }

        info!(
            user = bundle.user_id().unwrap_or("unknown"),
            expires_at = %bundle.expires_at,
            "Login completed"
        );
        self.session = Session::Authenticated(bundle);
        Ok(())
    }

    fn check_expiry(&mut self) {
        let expired = matches!(&self.session, Session::Authenticated(token) if token.is_expired());
        if expired {
            info!("Session token expired");
            self.session = Session::Expired;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::tests::fake_id_token;
    use crate::config::{ConfigStore, RawConfig};

    fn test_config(response_type: &str) -> Arc<Configuration> {
        let json = format!(
            r#"{{
                "notesApi": {{ "apiBaseUrl": "https://api.example.com/prod" }},
                "cognito": {{
                    "domain": "https://auth.example.com",
                    "clientId": "567v4db047v4jpujij7me8nb0u",
                    "redirectUri": "https://d84l1y8p4kdic.cloudfront.net/notes.html",
                    "scope": "email openid phone",
                    "responseType": "{}"
                }}
            }}"#,
            response_type
        );
        let raw = RawConfig::from_json_str(&json).expect("test config should parse");
        Arc::new(ConfigStore::load(raw).expect("test config should be valid"))
    }

    fn query(url: &Url) -> std::collections::HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    /// Callback the provider would send for the manager's pending login.
    fn implicit_callback(manager: &SessionManager, expires_in: &str) -> CallbackParams {
        let pending = manager.pending_login().expect("login should be pending");
        let id_token = fake_id_token(&serde_json::json!({
            "sub": "user-sub-1",
            "email": "user@example.com",
            "nonce": pending.nonce,
        }));
        CallbackParams::from_pairs([
            ("access_token", "access-token".to_string()),
            ("id_token", id_token),
            ("token_type", "Bearer".to_string()),
            ("expires_in", expires_in.to_string()),
            ("state", pending.state.clone()),
        ])
    }

    fn logged_in_manager() -> SessionManager {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let callback = implicit_callback(&manager, "3600");
        manager.complete_login(&callback).unwrap();
        manager
    }

    #[test]
    fn test_new_manager_is_unauthenticated() {
        let mut manager = SessionManager::new(test_config("token"));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert_eq!(manager.token().unwrap_err(), SessionError::NotAuthenticated);
    }

    #[test]
    fn test_begin_login_builds_hosted_login_url() {
        let mut manager = SessionManager::new(test_config("token"));
        let nav = manager.begin_login().unwrap();
        assert_eq!(manager.state(), SessionState::PendingRedirect);

        let url = match nav {
            Navigation::Login(url) => url,
            other => panic!("expected login navigation, got {:?}", other),
        };
        assert_eq!(url.host_str(), Some("auth.example.com"));
        assert_eq!(url.path(), "/oauth2/authorize");
        assert!(url
            .as_str()
            .contains("redirect_uri=https%3A%2F%2Fd84l1y8p4kdic.cloudfront.net%2Fnotes.html"));

        let params = query(&url);
        let pending = manager.pending_login().unwrap();
        assert_eq!(params["response_type"], "token");
        assert_eq!(params["client_id"], "567v4db047v4jpujij7me8nb0u");
        assert_eq!(params["redirect_uri"], "https://d84l1y8p4kdic.cloudfront.net/notes.html");
        assert_eq!(params["scope"], "email openid phone");
        assert_eq!(params["state"], pending.state);
        assert_eq!(params["nonce"], pending.nonce);
        assert!(!params.contains_key("code_challenge"));
    }

    #[test]
    fn test_begin_login_code_flow_includes_pkce() {
        let mut manager = SessionManager::new(test_config("code"));
        let nav = manager.begin_login().unwrap();
        let params = query(nav.url());
        let verifier = manager
            .pending_login()
            .and_then(|p| p.code_verifier.clone())
            .expect("code flow should keep a verifier");

        assert_eq!(params["response_type"], "code");
        assert_eq!(params["code_challenge"], pkce::code_challenge(&verifier));
        assert_eq!(params["code_challenge_method"], "S256");
    }

    #[test]
    fn test_begin_login_twice_replaces_pending() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let first = manager.pending_login().unwrap().clone();
        manager.begin_login().unwrap();
        assert_ne!(manager.pending_login().unwrap().state, first.state);
    }

    #[test]
    fn test_complete_login_authenticates() {
        let mut manager = logged_in_manager();
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert!(manager.pending_login().is_none());

        let token = manager.token().unwrap();
        assert_eq!(token.access_token, "access-token");
        assert_eq!(token.user_id(), Some("user-sub-1"));
        assert_eq!(token.bearer(), token.id_token.as_deref().unwrap());
    }

    #[test]
    fn test_complete_login_provider_error() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let state = manager.pending_login().unwrap().state.clone();

        let callback = CallbackParams::from_pairs([
            ("error", "access_denied".to_string()),
            ("error_description", "User cancelled".to_string()),
            ("state", state),
        ]);
        let err = manager.complete_login(&callback).unwrap_err();

        assert!(matches!(
            err,
            AuthCallbackError::ProviderDenied { ref error, .. } if error == "access_denied"
        ));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(manager.token().is_err());
    }

    #[test]
    fn test_complete_login_state_mismatch() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let genuine = implicit_callback(&manager, "3600");
        let callback = CallbackParams::from_pairs([
            ("access_token", genuine.get("access_token").unwrap().to_string()),
            ("id_token", genuine.get("id_token").unwrap().to_string()),
            ("expires_in", "3600".to_string()),
            ("state", "forged".to_string()),
        ]);

        assert!(matches!(
            manager.complete_login(&callback),
            Err(AuthCallbackError::StateMismatch)
        ));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_complete_login_nonce_mismatch() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let state = manager.pending_login().unwrap().state.clone();
        let id_token = fake_id_token(&serde_json::json!({ "sub": "u", "nonce": "replayed" }));

        let callback = CallbackParams::from_pairs([
            ("access_token", "access".to_string()),
            ("id_token", id_token),
            ("expires_in", "3600".to_string()),
            ("state", state),
        ]);
        assert!(matches!(
            manager.complete_login(&callback),
            Err(AuthCallbackError::NonceMismatch)
        ));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_complete_login_malformed() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let state = manager.pending_login().unwrap().state.clone();

        let callback = CallbackParams::from_pairs([("state", state)]);
        assert!(matches!(
            manager.complete_login(&callback),
            Err(AuthCallbackError::Malformed(_))
        ));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_complete_login_without_pending() {
        let mut manager = logged_in_manager();
        let callback = CallbackParams::from_pairs([("state", "whatever")]);

        assert!(matches!(
            manager.complete_login(&callback),
            Err(AuthCallbackError::NoPendingLogin)
        ));
        // An unsolicited callback does not disturb the existing session
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_implicit_callback_rejected_in_code_flow() {
        let mut manager = SessionManager::new(test_config("code"));
        manager.begin_login().unwrap();
        let callback = implicit_callback(&manager, "3600");

        assert!(matches!(
            manager.complete_login(&callback),
            Err(AuthCallbackError::Malformed(_))
        ));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_token_expiry_detected_lazily() {
        let mut manager = logged_in_manager();
        if let Session::Authenticated(ref mut token) = manager.session {
            token.expires_at = Utc::now() - Duration::seconds(1);
        }

        assert_eq!(manager.token().unwrap_err(), SessionError::TokenExpired);
        assert_eq!(manager.state(), SessionState::Expired);
    }

    #[test]
    fn test_zero_lifetime_token_is_expired_on_access() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let callback = implicit_callback(&manager, "0");
        manager.complete_login(&callback).unwrap();

        assert_eq!(manager.state(), SessionState::Expired);
    }

    #[test]
    fn test_expired_can_begin_login_again() {
        let mut manager = logged_in_manager();
        if let Session::Authenticated(ref mut token) = manager.session {
            token.expires_at = Utc::now() - Duration::minutes(5);
        }
        assert_eq!(manager.state(), SessionState::Expired);

        manager.begin_login().unwrap();
        assert_eq!(manager.state(), SessionState::PendingRedirect);
    }

    #[test]
    fn test_begin_login_while_authenticated_rejected() {
        let mut manager = logged_in_manager();
        assert_eq!(
            manager.begin_login().unwrap_err(),
            SessionError::AlreadyAuthenticated
        );
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_logout_from_any_state() {
        let mut manager = logged_in_manager();
        let nav = manager.logout();
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(manager.token().is_err());

        let url = match nav {
            Navigation::Logout(url) => url,
            other => panic!("expected logout navigation, got {:?}", other),
        };
        assert_eq!(url.path(), "/logout");
        let params = query(&url);
        assert_eq!(params["client_id"], "567v4db047v4jpujij7me8nb0u");
        assert_eq!(params["logout_uri"], "https://d84l1y8p4kdic.cloudfront.net/notes.html");

        let mut pending = SessionManager::new(test_config("token"));
        pending.begin_login().unwrap();
        pending.logout();
        assert_eq!(pending.state(), SessionState::Unauthenticated);
        assert!(pending.pending_login().is_none());

        let mut fresh = SessionManager::new(test_config("token"));
        fresh.logout();
        assert_eq!(fresh.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_resume_pending_login() {
        let mut first = SessionManager::new(test_config("token"));
        first.begin_login().unwrap();
        let saved = first.pending_login().unwrap().clone();
        let callback = implicit_callback(&first, "3600");

        // Simulate a reload: a fresh manager picks up the saved record
        let mut reloaded = SessionManager::new(test_config("token"));
        reloaded.resume(saved).unwrap();
        assert_eq!(reloaded.state(), SessionState::PendingRedirect);
        reloaded.complete_login(&callback).unwrap();
        assert_eq!(reloaded.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_resume_rejects_stale_or_mismatched() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let mut stale = manager.pending_login().unwrap().clone();
        stale.started_at = Utc::now() - Duration::minutes(PENDING_LOGIN_TTL_MINUTES + 1);

        let mut reloaded = SessionManager::new(test_config("token"));
        assert!(matches!(
            reloaded.resume(stale),
            Err(AuthCallbackError::PendingExpired)
        ));

        let mut code_manager = SessionManager::new(test_config("code"));
        code_manager.begin_login().unwrap();
        let code_pending = code_manager.pending_login().unwrap().clone();
        assert!(matches!(
            reloaded.resume(code_pending),
            Err(AuthCallbackError::Malformed(_))
        ));
        assert_eq!(reloaded.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_resume_while_authenticated_rejected() {
        let mut other = SessionManager::new(test_config("token"));
        other.begin_login().unwrap();
        let saved = other.pending_login().unwrap().clone();

        let mut manager = logged_in_manager();
        assert!(matches!(
            manager.resume(saved.clone()),
            Err(AuthCallbackError::Session(SessionError::AlreadyAuthenticated))
        ));
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(manager.token().unwrap().user_id(), Some("user-sub-1"));

        // Once the token lapses the saved record may be picked up again
        if let Session::Authenticated(ref mut token) = manager.session {
            token.expires_at = Utc::now() - Duration::seconds(1);
        }
        manager.resume(saved).unwrap();
        assert_eq!(manager.state(), SessionState::PendingRedirect);
    }

    #[test]
    fn test_complete_login_huge_expires_in() {
        let mut manager = SessionManager::new(test_config("token"));
        manager.begin_login().unwrap();
        let callback = implicit_callback(&manager, "9223372036854775807");

        assert!(matches!(
            manager.complete_login(&callback),
            Err(AuthCallbackError::Malformed(_))
        ));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(manager.token().is_err());
    }

    #[test]
    fn test_pending_login_serde_roundtrip() {
        let mut manager = SessionManager::new(test_config("code"));
        manager.begin_login().unwrap();
        let pending = manager.pending_login().unwrap();
        let json = serde_json::to_string(pending).unwrap();
        let parsed: PendingLogin = serde_json::from_str(&json).unwrap();
        assert_eq!(&parsed, pending);
    }
}
