//! Drydock CLI entry point.

use anyhow::Result;
use clap::{ColorChoice, Parser};

use drydock::cli::{self, Cli};
use drydock::config::ServerConfig;
use drydock::{logger, serve};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    serve::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = ServerConfig::load(&cli.root, &cli.config)?;
    cli::run(&cli, config)
}
