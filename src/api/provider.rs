use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::{ConsumptionInterval, RateInterval, StandingCharge, Timed},
    prelude::*,
};

/// Remote paginated time-series source.
///
/// Pages are 1-based and ordered newest-first: page 1 holds the latest records.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn unit_rates(&self, tariff_code: &str, page: u32) -> Result<Page<RateInterval>>;

    async fn standing_charges(&self, tariff_code: &str, page: u32) -> Result<Page<StandingCharge>>;

    async fn consumption(&self, page: u32) -> Result<Page<ConsumptionInterval>>;
}

#[must_use]
#[derive(Clone, Debug)]
pub struct Page<R> {
    /// Total number of records across all pages.
    pub count: usize,

    pub next: Option<String>,
    pub previous: Option<String>,

    /// Number of records the remote put on the page, before the client dropped any.
    pub page_size: usize,

    /// Newest and oldest record start on the page, before the client dropped any.
    pub span: Option<(DateTime<Utc>, DateTime<Utc>)>,

    pub results: Vec<R>,
}

impl<R> Page<R> {
    pub const fn empty() -> Self {
        Self { count: 0, next: None, previous: None, page_size: 0, span: None, results: Vec::new() }
    }

    /// Total number of pages, assuming that this is the first one.
    #[must_use]
    pub fn n_pages(&self) -> u32 {
        if self.next.is_none() || self.page_size == 0 {
            return 1;
        }
        u32::try_from(self.count.div_ceil(self.page_size)).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.span.map(|(newest, _)| newest)
    }

    #[must_use]
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.span.map(|(_, oldest)| oldest)
    }
}

impl<R: Timed> Page<R> {
    /// Page of the records exactly as the remote served them.
    pub fn unfiltered(count: usize, next: Option<String>, previous: Option<String>, results: Vec<R>) -> Self {
        let span = span(results.iter().map(Timed::start));
        Self { count, next, previous, page_size: results.len(), span, results }
    }
}

/// Newest and oldest of the instants.
#[must_use]
pub(super) fn span(starts: impl IntoIterator<Item = DateTime<Utc>>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    starts.into_iter().fold(None, |span, start| match span {
        None => Some((start, start)),
        Some((newest, oldest)) => Some((newest.max(start), oldest.min(start))),
    })
}
