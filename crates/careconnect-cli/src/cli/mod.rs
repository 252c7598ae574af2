//! CLI entry and dispatch.

use anyhow::{Context, Result};
use careconnect_core::app::App;
use careconnect_core::config;
use clap::Parser;

use crate::telemetry;

mod commands;

/// Process exit codes.
pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_REDIRECT: i32 = 2;

#[derive(Parser)]
#[command(name = "careconnect")]
#[command(version)]
#[command(about = "CareConnect admin session client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in with the admin password
    Login {
        /// Admin password (read from stdin when omitted)
        #[arg(long, env = "CARECONNECT_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Path to return to after login
        #[arg(long, value_name = "PATH")]
        return_to: Option<String>,
    },
    /// Log out and clear the stored session
    Logout,
    /// Show the current session state
    Status,
    /// Show the password hint
    Hint,
    /// Check whether a console path would render or redirect to login
    Open {
        /// Console path, e.g. /AdminDashboard
        #[arg(value_name = "PATH")]
        path: String,
    },
    /// Check backend health
    Health,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

/// Parses arguments, runs the command and returns the exit code.
///
/// # Errors
/// Returns an error for configuration, I/O and backend failures that are not
/// reported through an exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_tracing() {
        eprintln!("Warning: {e:#}");
    }

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<i32> {
    // Config commands must work even when the config file is broken.
    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(EXIT_OK)
            }
            ConfigCommands::Init => commands::config::init().map(|()| EXIT_OK),
        };
    }

    let config = config::Config::load().context("load config")?;
    let app = App::new(config).context("build session")?;

    match cli.command {
        Commands::Login {
            password,
            return_to,
        } => commands::auth::login(&app, password, return_to.as_deref()).await,
        Commands::Logout => Ok(commands::auth::logout(&app)),
        Commands::Status => Ok(commands::auth::status(&app).await),
        Commands::Hint => Ok(commands::auth::hint(&app).await),
        Commands::Open { path } => Ok(commands::route::open(&app, &path).await),
        Commands::Health => commands::health::run(&app).await,
        Commands::Config { .. } => Ok(EXIT_OK),
    }
}
