use crate::sync::SeriesKind;

/// Latest state of the sync, published on a watch channel.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SyncProgress {
    pub series: Option<SeriesKind>,
    pub tariff_code: Option<String>,
    pub phase: SyncPhase,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum SyncPhase {
    #[default]
    Idle,

    /// Fetching the pages that establish the remote range.
    FetchingPrimary,

    /// Paging through the rest of the remote series.
    Backfilling { page: u32, n_pages: u32 },

    Complete { inserted: usize, updated: usize },

    Failed { reason: String },
}
