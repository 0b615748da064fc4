use std::fmt::{Debug, Formatter};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Half-open time interval.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[must_use]
pub struct Interval {
    /// Inclusive.
    pub start: DateTime<Utc>,

    /// Exclusive.
    pub end: DateTime<Utc>,
}

impl Debug for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl Interval {
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Build a non-empty interval.
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn duration(self) -> TimeDelta {
        self.end - self.start
    }

    #[must_use]
    pub fn midpoint(self) -> DateTime<Utc> {
        self.start + self.duration() / 2
    }

    #[must_use]
    pub fn contains(self, other: DateTime<Utc>) -> bool {
        (self.start <= other) && (other < self.end)
    }

    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Common part of the two intervals, if it is not empty.
    #[must_use]
    pub fn intersect(self, other: Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_try_new_rejects_empty() {
        assert!(matches!(Interval::try_new(at(2), at(2)), Err(Error::InvalidDateRange { .. })));
        assert!(matches!(Interval::try_new(at(3), at(2)), Err(Error::InvalidDateRange { .. })));
        assert!(Interval::try_new(at(2), at(3)).is_ok());
    }

    #[test]
    fn test_contains_is_half_open() {
        let interval = Interval::new(at(1), at(2));
        assert!(interval.contains(at(1)));
        assert!(!interval.contains(at(2)));
    }

    #[test]
    fn test_intersect() {
        let lhs = Interval::new(at(1), at(5));
        assert_eq!(lhs.intersect(Interval::new(at(3), at(8))), Some(Interval::new(at(3), at(5))));
        assert_eq!(lhs.intersect(Interval::new(at(5), at(8))), None);
        assert!(!lhs.overlaps(Interval::new(at(5), at(8))));
    }

    #[test]
    fn test_midpoint() {
        let interval = Interval::new(at(1), at(1) + TimeDelta::minutes(30));
        assert_eq!(interval.midpoint(), at(1) + TimeDelta::minutes(15));
    }
}
