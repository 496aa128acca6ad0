//! Command-line argument definitions for ephemera.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for ephemera.
#[derive(Debug, Parser)]
#[command(name = "ephemera")]
#[command(
    author,
    version,
    about = "Disposable containerised dependencies for integration tests"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Host reported on resolved endpoints.
    #[arg(long, global = true)]
    pub host: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision a postgres container, ping it, and tear it down.
    Check(CheckArgs),

    /// Verify the container engine responds.
    Engine,
}

/// Arguments for the `check` subcommand.
#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Override the configured postgres image.
    #[arg(long)]
    pub image: Option<String>,

    /// Override the configured startup timeout, in seconds. Must be positive.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,
}
