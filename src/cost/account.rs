use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::interval::Interval;

/// Tariff the account was on over `[valid_from, valid_to)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub tariff_code: String,
    pub valid_from: DateTime<Utc>,

    /// `None` for the current agreement.
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl Agreement {
    /// Part of the period that the agreement was in force.
    #[must_use]
    pub fn overlap_with(&self, period: Interval) -> Option<Interval> {
        let end = self.valid_to.unwrap_or(period.end);
        (self.valid_from < end).then(|| Interval::new(self.valid_from, end)).and_then(|in_force| in_force.intersect(period))
    }
}

/// Split the period by the agreements, sorted by start, skipping agreements that do not overlap it.
#[must_use]
pub fn split_by_agreements(agreements: &[Agreement], period: Interval) -> Vec<(&Agreement, Interval)> {
    let mut parts: Vec<_> = agreements
        .iter()
        .filter_map(|agreement| agreement.overlap_with(period).map(|part| (agreement, part)))
        .collect();
    parts.sort_by_key(|(_, part)| part.start);
    parts
}
