//! nodedb CLI Binary
//!
//! Command-line interface for a local node metadata cache.

use anyhow::Context;
use clap::Parser;
use nodedb::logging::init_logging;
use nodedb::tooling::cli::{Cli, CliContext};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CliContext::load_config(&cli).context("loading configuration")?;
    init_logging(Some(&config.logging)).context("initializing logging")?;

    let context = CliContext::new(&cli).context("opening node store")?;
    let output = context.execute(&cli.command)?;
    println!("{}", output);
    Ok(())
}
