//! Greylit CLI: tiered grey-literature search over the Custom Search API.
//!
//! Runs a search plan across a list of websites, escalating through up to
//! three query tiers, and exports the results to CSV and optionally Airtable.

mod commands;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
