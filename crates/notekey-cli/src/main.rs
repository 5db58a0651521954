//! Notekey - hosted-login helper for the Notes API.
//!
//! Loads the client configuration, walks through the redirect-based login
//! from a terminal and reports the resulting session.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "notekey", version, about = "Hosted-login helper for the Notes API")]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print the effective values
    Check,
    /// Print a hosted-login URL
    LoginUrl,
    /// Log in interactively by pasting the redirect URL back
    Login,
    /// Print the hosted sign-out URL
    LogoutUrl,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing();
    info!(command = ?cli.command, "notekey starting");

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Check => commands::check(&config),
        Command::LoginUrl => commands::login_url(config),
        Command::Login => commands::login(config).await,
        Command::LogoutUrl => commands::logout_url(config),
    }
}
