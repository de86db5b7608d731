//! Entrywatch CLI library
//!
//! Verifies that a reconciler mirroring Kubernetes custom resources into
//! Consul config entries converges: entries appear, follow updates, and
//! disappear, in the namespace the routing policy dictates.

pub mod commands;
pub mod config;
pub mod error;
pub mod expectation;
pub mod fixtures;
pub mod mutate;
pub mod report;
pub mod scenario;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};
use entrywatch_common::telemetry::LogFormat;

/// Entrywatch - config entry convergence checks
#[derive(Parser, Debug)]
#[command(name = "entrywatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format (pretty or json)
    #[arg(long, global = true, default_value = "pretty", env = "ENTRYWATCH_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured scenarios and report
    Run(commands::run::RunArgs),
    /// Print the backing namespace for a tenant under a routing policy
    Resolve(commands::resolve::ResolveArgs),
    /// Fetch one config entry from Consul
    Get(commands::get::GetArgs),
    /// Print the reference scenario matrix as YAML
    Matrix(commands::matrix::MatrixArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args).await,
            Commands::Resolve(args) => commands::resolve::run(args).await,
            Commands::Get(args) => commands::get::run(args).await,
            Commands::Matrix(args) => commands::matrix::run(args).await,
        }
    }
}
