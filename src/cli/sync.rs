use chrono::NaiveDate;
use anyhow::ensure;
use clap::Parser;
use tariff_ledger::sync::{SyncOptions, SyncPhase};
use tracing::{debug, error, info};

use crate::{
    cli::{heartbeat::HeartbeatArgs, ledger::LedgerArgs},
    tables::build_coverage_table,
};

#[derive(Parser)]
pub struct SyncArgs {
    #[clap(flatten)]
    ledger: LedgerArgs,

    #[clap(long = "tariff-code", env = "TARIFF_CODE")]
    tariff_code: String,

    /// Do not fill an empty series further back than this local date.
    #[clap(long, env = "SYNC_SINCE")]
    since: Option<NaiveDate>,

    /// Ignore the cooldown of the previously failed syncs.
    #[clap(long)]
    force: bool,

    #[clap(flatten)]
    heartbeat: HeartbeatArgs,
}

impl SyncArgs {
    pub async fn run(self) -> anyhow::Result<()> {
        let ledger = self.ledger.build().await?;
        let options = SyncOptions::builder()
            .maybe_since(self.since.map(|since| self.ledger.midnight(since)))
            .force(self.force)
            .build();

        let mut progress = ledger.progress();
        let watcher = tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let progress = progress.borrow_and_update().clone();
                if let SyncPhase::Backfilling { page, n_pages } = progress.phase {
                    debug!(series = ?progress.series, page, n_pages, "backfilling…");
                }
            }
        });
        let outcomes = ledger.ensure_coverage(&self.tariff_code, &options).await;
        watcher.abort();

        let mut coverages = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        for (series, result) in outcomes {
            match result {
                Ok(coverage) => coverages.push(coverage),
                Err(error) => {
                    error!(?series, "failed to sync: {error:#}");
                    failed.push(series);
                }
            }
        }
        info!(n_synced = coverages.len(), n_failed = failed.len(), "done");
        println!("{}", build_coverage_table(&coverages));
        ensure!(failed.is_empty(), "failed to sync {failed:?}");
        self.heartbeat.send().await;
        Ok(())
    }
}
