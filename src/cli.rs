mod cost;
mod heartbeat;
mod ledger;
mod sync;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::cli::{
    cost::{AccountCostArgs, CostArgs},
    ledger::LedgerArgs,
    sync::SyncArgs,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring the local rates, standing charges, and consumption up to date.
    #[clap(name = "sync")]
    Sync(Box<SyncArgs>),

    /// Price the consumption over a period under a tariff or a manual plan.
    #[clap(name = "cost")]
    Cost(Box<CostArgs>),

    /// Price the consumption over a period across the account's tariff agreements.
    #[clap(name = "account-cost")]
    AccountCost(Box<AccountCostArgs>),

    /// Delete the stored cost calculations.
    #[clap(name = "reset-cache")]
    ResetCache(Box<LedgerArgs>),
}

impl Command {
    pub async fn run(self) -> anyhow::Result<()> {
        match self {
            Self::Sync(args) => (*args).run().await,
            Self::Cost(args) => (*args).run().await,
            Self::AccountCost(args) => (*args).run().await,
            Self::ResetCache(args) => {
                let n_deleted = args.build().await?.reset_cache().await?;
                info!(n_deleted, "done");
                Ok(())
            }
        }
    }
}
