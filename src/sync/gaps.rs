use chrono::{DateTime, TimeDelta, Utc};
use itertools::Itertools;

use crate::{core::interval::Interval, db::Extent};

/// Number of records that a gap-free series of the cadence would have over the extent.
#[must_use]
pub fn expected_count(extent: &Extent, cadence: TimeDelta) -> usize {
    let end = extent.max_end.unwrap_or(extent.max_start + cadence);
    let span = (end - extent.min_start).num_seconds();
    usize::try_from(span / cadence.num_seconds().max(1)).unwrap_or(0)
}

#[must_use]
pub fn has_gaps(extent: &Extent, cadence: TimeDelta) -> bool {
    extent.count < expected_count(extent, cadence)
}

/// Missing stretches between consecutive record starts, in ascending order.
pub fn find_gaps(
    starts: impl IntoIterator<Item = DateTime<Utc>>,
    cadence: TimeDelta,
) -> Vec<Interval> {
    starts
        .into_iter()
        .tuple_windows()
        .filter_map(|(previous, next)| {
            let expected = previous + cadence;
            (next > expected).then(|| Interval::new(expected, next))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    #[test]
    fn test_expected_count() {
        let extent = Extent { min_start: at(0), max_start: at(90), max_end: Some(at(120)), count: 4 };
        assert_eq!(expected_count(&extent, TimeDelta::minutes(30)), 4);
        assert!(!has_gaps(&extent, TimeDelta::minutes(30)));
        assert!(has_gaps(&Extent { count: 3, ..extent }, TimeDelta::minutes(30)));
    }

    #[test]
    fn test_find_gaps() {
        let gaps = find_gaps([at(0), at(30), at(120), at(150), at(210)], TimeDelta::minutes(30));
        assert_eq!(gaps, vec![Interval::new(at(60), at(120)), Interval::new(at(180), at(210))]);
    }
}
