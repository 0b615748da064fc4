mod cli;
mod tables;

use clap::{Parser, crate_version};
use tracing::info;

use crate::cli::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");
    Args::parse().command.run().await
}
