//! Duet CLI Binary
//!
//! Runs the two moderation agents and inspects their state.

use anyhow::Context;
use clap::Parser;
use duet::logging::init_logging;
use duet::tooling::cli::{Cli, CliContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context =
        CliContext::new(cli.config.clone()).context("Failed to load configuration")?;
    let logging = context.logging_config(&cli)?;
    init_logging(Some(&logging)).context("Failed to initialize logging")?;

    let output = context.execute(&cli.command).await?;
    println!("{}", output);
    Ok(())
}
