//! ## devsim-cli
//! **Runs one simulated IoT device**
//!
//! Loads the device configuration, starts the pipeline and keeps it running
//! until SIGINT / SIGTERM, then shuts down within the grace period.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run(cli).await
}
