//! Command-line interface definitions and dispatch.
//!
//! Every subcommand except `serve` runs in a short-lived process that talks
//! to the server purely through the on-disk protocol: commands go into the
//! mailbox, discovery reads the server record. No sockets are involved.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::config::{Environment, ServerConfig};
use crate::mailbox::Command;
use crate::{log, record, serve};

/// Drydock development server CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Project root directory
    #[arg(short, long, global = true, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub root: PathBuf,

    /// Config file path, relative to the project root
    #[arg(short = 'C', long, global = true, default_value = "drydock.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the development server
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Base port number
        #[arg(short, long)]
        port: Option<u16>,

        /// Run in production mode (bind the configured port exactly)
        #[arg(long)]
        production: bool,
    },

    /// Ask the running server to shut down
    Stop,

    /// Set the status line shown to connected clients
    Status {
        /// Status text
        text: String,

        /// Mark the status as an error
        #[arg(short, long)]
        error: bool,

        /// Auto-clear the status after this many milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Clear the status line
    ClearStatus,

    /// Bump the version counter consumed by live-reload clients
    BumpVersion,

    /// Pause client event broadcasting
    Pause,

    /// Resume client event broadcasting
    Resume,

    /// Show the server record for this project
    Info,
}

/// Dispatch a parsed command line.
pub fn run(cli: &Cli, mut config: ServerConfig) -> Result<()> {
    match &cli.command {
        Commands::Serve {
            interface,
            port,
            production,
        } => {
            if let Some(interface) = interface {
                config.serve.interface = *interface;
            }
            if let Some(port) = port {
                config.serve.port = *port;
            }
            if *production {
                config.serve.environment = Environment::Production;
            }
            serve::run_server(&config)
        }
        Commands::Stop => enqueue(&config, Command::Stop),
        Commands::Status {
            text,
            error,
            timeout_ms,
        } => enqueue(
            &config,
            Command::SetStatus {
                text: text.clone(),
                is_error: *error,
                timeout_ms: *timeout_ms,
            },
        ),
        Commands::ClearStatus => enqueue(&config, Command::ClearStatus),
        Commands::BumpVersion => enqueue(&config, Command::IncrementVersion),
        Commands::Pause => enqueue(&config, Command::PauseClientEvents),
        Commands::Resume => enqueue(&config, Command::ResumeClientEvents),
        Commands::Info => run_info(&config),
    }
}

fn enqueue(config: &ServerConfig, command: Command) -> Result<()> {
    serve::send_command(config, &command)?;
    log!("mailbox"; "queued {command:?}");
    Ok(())
}

/// Print the server record with a liveness verdict.
fn run_info(config: &ServerConfig) -> Result<()> {
    let Some(existing) = record::read(&config.record_path()) else {
        log!("info"; "no server record found for this project");
        return Ok(());
    };

    let verdict = if existing.is_live() {
        "running".green().to_string()
    } else {
        "stale (process is gone)".red().to_string()
    };
    log!(
        "info";
        "{} server on port {} (pid {}) - {}",
        existing.environment, existing.port, existing.pid, verdict
    );
    Ok(())
}
