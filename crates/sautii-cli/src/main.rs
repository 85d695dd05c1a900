//! Sautii CLI - sign in, inspect and gate navigation against the Sautii
//! session core from a terminal.

mod app;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use sautii_core::Config;

/// Set to `1` to also write logs to a daily file under the cache directory
const LOG_FILE_VAR: &str = "SAUTII_LOG_FILE";

#[derive(Parser)]
#[command(name = "sautii")]
#[command(version)]
#[command(about = "Sign in to Sautii and check what your session can reach")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with a national ID or email
    SignIn {
        /// Prompted for when omitted
        #[arg(long)]
        login_id: Option<String>,
    },
    /// Create an account
    SignUp {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// National ID number (8 digits)
        #[arg(long)]
        id_number: String,
    },
    /// End the current session
    SignOut,
    /// Show the current session
    Status {
        /// Print the session as JSON
        #[arg(long)]
        json: bool,
    },
    /// Exchange the refresh token for a new session
    Refresh,
    /// Check whether a screen is reachable, e.g. `/forums` or `/(tabs)/settings`
    Open { path: String },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: u8, cache_dir: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level unless -v is given
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let log_to_file = std::env::var(LOG_FILE_VAR).map(|v| v == "1").unwrap_or(false);
    let (file_layer, guard) = match cache_dir.filter(|_| log_to_file) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), "sautii.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    let cache_dir = config.cache_dir().ok();
    let _log_guard = init_tracing(cli.verbose, cache_dir.as_deref());
    info!(storage = %config.storage, "Sautii CLI starting");

    let mut app = App::new(config)?;
    match cli.command {
        Command::SignIn { login_id } => app.sign_in(login_id).await,
        Command::SignUp {
            name,
            email,
            id_number,
        } => app.sign_up(name, email, id_number).await,
        Command::SignOut => app.sign_out().await,
        Command::Status { json } => app.status(json),
        Command::Refresh => app.refresh().await,
        Command::Open { path } => app.open(&path).await,
    }
}
