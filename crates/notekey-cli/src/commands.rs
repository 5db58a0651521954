use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use notekey_core::{
    CallbackParams, ConfigStore, Configuration, RawConfig, ResponseType, SessionManager,
    SessionState, TokenClient,
};
use tracing::debug;

/// Set when the configuration should come from the environment.
const ENV_MARKER: &str = "NOTES_API_BASE_URL";

/// `--config` wins, then the environment, then the default config file.
pub fn load_config(path: Option<&Path>) -> Result<Arc<Configuration>> {
    let config = match path {
        Some(path) => ConfigStore::load_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if std::env::var_os(ENV_MARKER).is_some() => {
            debug!("Loading configuration from environment");
            ConfigStore::load(RawConfig::from_env())
                .context("Invalid configuration in environment")?
        }
        None => {
            let path = ConfigStore::default_path()?;
            ConfigStore::load_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
    };
    Ok(Arc::new(config))
}

pub fn check(config: &Configuration) -> Result<()> {
    println!("Configuration OK\n");
    println!("  API base URL:   {}", config.api_base_url());
    println!("  Login domain:   {}", config.identity_domain());
    println!("  Client ID:      {}", config.client_id());
    println!("  Redirect URI:   {}", config.redirect_uri());
    println!("  Logout URI:     {}", config.logout_uri());
    println!("  Scopes:         {}", config.scopes().to_param());
    println!("  Response type:  {}", config.response_type());
    println!("\nThe redirect URI must exactly match one registered with the identity provider.");
    Ok(())
}

pub fn login_url(config: Arc<Configuration>) -> Result<()> {
    let mut session = SessionManager::new(config);
    let navigation = session.begin_login()?;
    // The pending record stays in this process; use `login` to finish a sign-in
    println!("{}", navigation.url());
    Ok(())
}

pub fn logout_url(config: Arc<Configuration>) -> Result<()> {
    let mut session = SessionManager::new(config);
    println!("{}", session.logout().url());
    Ok(())
}

/// Interactive login: the user opens the URL, signs in, and pastes back the
/// address the browser was redirected to.
pub async fn login(config: Arc<Configuration>) -> Result<()> {
    println!("\n=== Notekey Login ===\n");

    let mut session = SessionManager::new(config.clone());
    let navigation = session.begin_login()?;

    println!("Open this URL in a browser and sign in:\n");
    println!("  {}\n", navigation.url());
    print!("Paste the URL you were redirected to: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let params = CallbackParams::from_redirect_url(input.trim())?;

    println!("\nCompleting login...");

    match config.response_type() {
        ResponseType::Token => session.complete_login(&params)?,
        ResponseType::Code => {
            let client = TokenClient::new(config.clone())?;
            session
                .complete_login_with_code(&params, &client)
                .await?
        }
    }

    print_session(&mut session)?;
    Ok(())
}

fn print_session(session: &mut SessionManager) -> Result<()> {
    let state = session.state();
    println!("Session state: {:?}", state);
    if state != SessionState::Authenticated {
        return Ok(());
    }

    let token = session.token()?;
    if let Some(ref claims) = token.claims {
        println!("  User:         {}", claims.sub);
        if let Some(ref email) = claims.email {
            println!("  Email:        {}", email);
        }
    }
    println!(
        "  Expires at:   {} ({} min)",
        token.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
        token.minutes_until_expiry()
    );
    println!("\nLogin successful!\n");
    Ok(())
}
