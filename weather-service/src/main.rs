//! Binary crate for the weather aggregation daemon.
//!
//! This crate focuses on:
//! - Parsing CLI flags
//! - Wiring providers, decorators, collector, and stores together
//! - Process lifecycle: startup validation and graceful shutdown

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
