use chrono::{DateTime, Utc};

use crate::{core::interval::Interval, sync::SeriesKind};

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid URL `{url}`")]
    InvalidUrl { url: String },

    #[error("request failed")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode the response")]
    Decode(#[source] serde_json::Error),

    #[error("no consumption data in {period:?}")]
    NoDataAvailable { period: Interval },

    #[error("insufficient data: available {available:?}, requested {requested:?}")]
    InsufficientData { available: Interval, requested: Interval },

    #[error("invalid date range: {start} to {end}")]
    InvalidDateRange { start: DateTime<Utc>, end: DateTime<Utc> },

    #[error("{series:?} sync for {tariff:?} is cooling down until {until}")]
    CoolingDown { series: SeriesKind, tariff: Option<String>, until: DateTime<Utc> },

    #[error("{series:?} sync for {tariff:?} is already in progress")]
    SyncInProgress { series: SeriesKind, tariff: Option<String> },

    #[error("store failure: {0}")]
    Store(String),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Store(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_display() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            Error::InvalidDateRange { start, end }.to_string(),
            "invalid date range: 2024-01-02 00:00:00 UTC to 2024-01-01 00:00:00 UTC",
        );
    }

    #[test]
    fn test_io_error_is_a_store_failure() {
        let error = Error::from(std::io::Error::other("disk full"));
        assert_eq!(error.to_string(), "store failure: disk full");
    }
}
