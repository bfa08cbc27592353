mod auth;
mod cli;
mod config;
mod error;
mod gitlab;
mod lifecycle;
mod liveness;
mod output;
mod pipeline;
mod reconcile;
mod topology;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting GitLab CI Bridge");
    cli.execute().await?;

    Ok(())
}
