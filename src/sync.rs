//! Incremental, resumable synchronisation of the remote series into the store.
//!
//! The remote serves every series newest first. An empty local copy is filled by paging
//! forward from the newest record. A non-empty copy is extended at both ends: forward
//! from page 1 for records newer than the local maximum, and backward from the last page
//! for records older than the local minimum. When neither end moves but a fixed-cadence
//! series has holes, the pages down to the earliest hole are re-fetched and upserted.

mod gaps;
mod progress;
mod series;
mod throttle;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use enumset::EnumSet;
use tokio::sync::watch;

pub use self::{
    progress::{SyncPhase, SyncProgress},
    series::{Series, SeriesKind},
};
use self::{gaps::find_gaps, throttle::Throttle};
use crate::{
    api::{Page, Provider},
    core::horizon::HorizonRule,
    db::{ConsumptionInterval, Db, Extent, Query, RateInterval, StandingCharge, UpsertSummary},
    prelude::*,
};

#[must_use]
#[derive(Clone, Debug, bon::Builder)]
pub struct SyncOptions {
    /// Reference instant for the horizon and the cooldown.
    #[builder(default = Utc::now())]
    pub now: DateTime<Utc>,

    /// Stop the initial fill once the records get older than this.
    pub since: Option<DateTime<Utc>>,

    /// Ignore the failure cooldown.
    #[builder(default)]
    pub force: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Outcome of a series sync.
#[must_use]
#[derive(Clone, Debug)]
pub struct Coverage {
    pub series: SeriesKind,
    pub tariff_code: Option<String>,
    pub horizon: DateTime<Utc>,
    pub n_fetched_pages: u32,
    pub summary: UpsertSummary,

    /// Local extent after the sync.
    pub extent: Option<Extent>,
}

impl Coverage {
    /// Whether the local copy reaches the horizon.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.extent.is_some_and(|extent| extent.max_end.is_none_or(|end| end >= self.horizon))
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    db: Db,
    provider: Arc<dyn Provider>,
    horizon_rule: HorizonRule,
    cooldown: TimeDelta,
    throttle: Arc<Throttle>,
    progress: Arc<watch::Sender<SyncProgress>>,
}

impl SyncEngine {
    pub fn new(db: Db, provider: Arc<dyn Provider>, horizon_rule: HorizonRule, cooldown: TimeDelta) -> Self {
        Self {
            db,
            provider,
            horizon_rule,
            cooldown,
            throttle: Arc::default(),
            progress: Arc::new(watch::Sender::new(SyncProgress::default())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Sync the selected series of the tariff concurrently.
    ///
    /// Each series succeeds or fails on its own: a failing or cooling down series does not stop the others.
    #[instrument(skip_all, fields(tariff_code = tariff_code))]
    pub async fn ensure_coverage(
        &self,
        tariff_code: &str,
        series: EnumSet<SeriesKind>,
        options: &SyncOptions,
    ) -> Vec<(SeriesKind, Result<Coverage>)> {
        let (rates, standing_charges, consumption) = tokio::join!(
            self.ensure_selected::<RateInterval>(series, tariff_code, options),
            self.ensure_selected::<StandingCharge>(series, tariff_code, options),
            self.ensure_selected::<ConsumptionInterval>(series, tariff_code, options),
        );
        [rates, standing_charges, consumption].into_iter().flatten().collect()
    }

    async fn ensure_selected<S: Series>(
        &self,
        series: EnumSet<SeriesKind>,
        tariff_code: &str,
        options: &SyncOptions,
    ) -> Option<(SeriesKind, Result<Coverage>)> {
        if series.contains(S::KIND) {
            Some((S::KIND, self.ensure_series::<S>(tariff_code, options).await))
        } else {
            None
        }
    }

    /// Bring the local copy of the series up to its horizon.
    #[instrument(skip_all, fields(series = ?S::KIND, tariff_code = tariff_code))]
    pub async fn ensure_series<S: Series>(&self, tariff_code: &str, options: &SyncOptions) -> Result<Coverage> {
        let scope = S::scope(tariff_code);
        let mut permit = self.throttle.acquire(S::KIND, scope.clone(), options.now, options.force)?;
        let pager = Pager::<S> {
            engine: self,
            tariff_code,
            scope,
            n_fetched_pages: 0,
            summary: UpsertSummary::default(),
            pinned: Vec::new(),
        };
        match pager.run(options).await {
            Ok(coverage) => {
                info!(?coverage.summary, coverage.n_fetched_pages, "synced");
                self.publish(S::KIND, coverage.tariff_code.clone(), SyncPhase::Complete {
                    inserted: coverage.summary.inserted,
                    updated: coverage.summary.updated,
                });
                Ok(coverage)
            }
            Err(error) => {
                error!("sync failed: {error:#}");
                permit.cool_down_until(options.now + self.cooldown);
                self.publish(S::KIND, S::scope(tariff_code), SyncPhase::Failed { reason: error.to_string() });
                Err(error)
            }
        }
    }

    fn publish(&self, series: SeriesKind, tariff_code: Option<String>, phase: SyncPhase) {
        self.progress.send_replace(SyncProgress { series: Some(series), tariff_code, phase });
    }
}

/// State of a single series sync.
struct Pager<'a, S> {
    engine: &'a SyncEngine,
    tariff_code: &'a str,
    scope: Option<String>,
    n_fetched_pages: u32,
    summary: UpsertSummary,

    /// First and last pages, fetched once per sync.
    pinned: Vec<(u32, Page<S>)>,
}

impl<S: Series> Pager<'_, S> {
    async fn run(mut self, options: &SyncOptions) -> Result<Coverage> {
        let horizon = S::horizon(&self.engine.horizon_rule, options.now);
        let cadence = S::cadence(self.tariff_code);
        let local = self.local_extent().await?;

        if let Some(extent) = local
            && extent.max_end.is_none_or(|end| end >= horizon)
            && !cadence.is_some_and(|cadence| gaps::has_gaps(&extent, cadence))
        {
            debug!(?extent, %horizon, "already covered");
            return self.finish(horizon).await;
        }

        self.publish(SyncPhase::FetchingPrimary);
        let first = self.fetch(1).await?;
        self.pinned.push((1, first.clone()));
        let Some(remote_newest) = first.newest() else {
            info!("remote series is empty");
            return self.finish(horizon).await;
        };
        let n_pages = first.n_pages();

        let Some(extent) = local else {
            info!(n_pages, "filling the empty series…");
            let since = options.since;
            self.forward(n_pages, |_| true, |oldest| since.is_some_and(|since| oldest < since)).await?;
            return self.finish(horizon).await;
        };

        let last = self.fetch(n_pages).await?;
        self.pinned.push((n_pages, last.clone()));
        let has_newer = remote_newest > extent.max_start;
        let has_older = last.oldest().is_some_and(|remote_oldest| remote_oldest < extent.min_start);

        if has_newer {
            info!(%remote_newest, local_newest = %extent.max_start, "fetching newer records…");
            self.forward(
                n_pages,
                |record| record.start() > extent.max_start,
                |oldest| oldest <= extent.max_start,
            )
            .await?;
        }
        if has_older {
            info!(local_oldest = %extent.min_start, "backfilling older records…");
            self.backward(
                n_pages,
                |record| record.start() < extent.min_start,
                |newest| newest >= extent.min_start,
            )
            .await?;
        }
        if !has_newer
            && !has_older
            && let Some(cadence) = cadence
        {
            self.patch_gaps(n_pages, cadence).await?;
        }
        self.finish(horizon).await
    }

    /// Re-fetch the pages down to the earliest local gap and upsert them whole.
    async fn patch_gaps(&mut self, n_pages: u32, cadence: TimeDelta) -> Result {
        let starts = self
            .engine
            .db
            .table::<S>()
            .find(Query::filter(self.in_scope()))
            .await?
            .into_iter()
            .map(|record| record.start());
        let gaps = find_gaps(starts, cadence);
        let Some(earliest) = gaps.first().copied() else {
            return Ok(());
        };
        warn!(n_gaps = gaps.len(), %earliest.start, "patching gaps…");
        self.forward(n_pages, |_| true, |oldest| oldest <= earliest.start).await
    }

    /// Walk pages 1, 2, … until a page satisfies the stop condition on its oldest record.
    async fn forward(
        &mut self,
        n_pages: u32,
        keep: impl Fn(&S) -> bool + Send + Sync,
        stop: impl Fn(DateTime<Utc>) -> bool + Send + Sync,
    ) -> Result {
        let mut number = 1;
        loop {
            let page = self.fetch(number).await?;
            let oldest = page.oldest();
            let has_next = page.next.is_some();
            self.store(page.results.into_iter().filter(|record| keep(record)).collect()).await?;
            self.publish(SyncPhase::Backfilling { page: number, n_pages });
            if !has_next || oldest.is_none_or(&stop) {
                return Ok(());
            }
            number += 1;
        }
    }

    /// Walk pages N, N-1, … until a page satisfies the stop condition on its newest record.
    async fn backward(
        &mut self,
        n_pages: u32,
        keep: impl Fn(&S) -> bool + Send + Sync,
        stop: impl Fn(DateTime<Utc>) -> bool + Send + Sync,
    ) -> Result {
        let mut number = n_pages;
        loop {
            let page = self.fetch(number).await?;
            let newest = page.newest();
            self.store(page.results.into_iter().filter(|record| keep(record)).collect()).await?;
            self.publish(SyncPhase::Backfilling { page: number, n_pages });
            if number <= 1 || newest.is_none_or(&stop) {
                return Ok(());
            }
            number -= 1;
        }
    }

    async fn fetch(&mut self, number: u32) -> Result<Page<S>> {
        if let Some((_, page)) = self.pinned.iter().find(|(pinned, _)| *pinned == number) {
            return Ok(page.clone());
        }
        debug!(number, "fetching page…");
        let page = S::fetch(self.engine.provider.as_ref(), self.tariff_code, number).await?;
        self.n_fetched_pages += 1;
        Ok(page)
    }

    /// Records are committed page by page, so an interrupted sync keeps what it has stored.
    async fn store(&mut self, records: Vec<S>) -> Result {
        if records.is_empty() {
            return Ok(());
        }
        self.summary += self.engine.db.table::<S>().upsert(records).await?;
        Ok(())
    }

    async fn local_extent(&self) -> Result<Option<Extent>> {
        self.engine.db.table::<S>().extent(self.in_scope()).await
    }

    fn in_scope(&self) -> impl Fn(&S) -> bool + Send + Sync + 'static {
        let tariff_code = self.tariff_code.to_owned();
        move |record: &S| record.is_in_scope(&tariff_code)
    }

    fn publish(&self, phase: SyncPhase) {
        self.engine.publish(S::KIND, self.scope.clone(), phase);
    }

    async fn finish(self, horizon: DateTime<Utc>) -> Result<Coverage> {
        let extent = self.local_extent().await?;
        Ok(Coverage {
            series: S::KIND,
            tariff_code: self.scope,
            horizon,
            n_fetched_pages: self.n_fetched_pages,
            summary: self.summary,
            extent,
        })
    }
}
