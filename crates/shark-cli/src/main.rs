//! The `shark` command: run and inspect Shark bytecode archives.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::inspect::InspectCommand;
use commands::run::RunCommand;

#[derive(Parser)]
#[command(name = "shark", version, about = "Shark bytecode VM")]
struct Cli {
    /// Configuration file (default: shark.toml in the current directory or a parent)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `shark_vm_core=trace`
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an archive and run its main module
    Run(RunCommand),
    /// Print the contents of an archive
    Inspect(InspectCommand),
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let loaded = config::load_config(cli.config.as_deref())?;
    init_logging(cli.log_level.as_deref(), loaded.config.log.level.as_deref())?;
    if let Some(path) = &loaded.path {
        tracing::debug!(config = %path.display(), "configuration loaded");
    }

    match cli.command {
        Commands::Run(cmd) => cmd.run(&loaded),
        Commands::Inspect(cmd) => cmd.run(),
    }
}

/// `--log-level` wins, then `RUST_LOG`, then the config file, then `warn`
fn init_logging(flag: Option<&str>, from_config: Option<&str>) -> Result<()> {
    let filter = match flag {
        Some(level) => EnvFilter::try_new(level)?,
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(from_config.unwrap_or("warn"))?,
        },
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
