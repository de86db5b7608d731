//! Entrywatch CLI
//!
//! Drives source custom resources through create, update and delete and
//! checks that Consul config entries follow.

use clap::Parser;

use entrywatch_cli::{Cli, Result};
use entrywatch_common::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;
    cli.run().await
}
