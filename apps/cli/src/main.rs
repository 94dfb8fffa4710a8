//! pagegen CLI: service×location landing page generator.
//!
//! Pulls services and locations from the content store, decides which
//! combinations deserve an indexable page, and writes the resulting sitemap.

mod commands;

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
