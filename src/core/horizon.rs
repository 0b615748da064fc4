use chrono::{DateTime, Days, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

/// Rule for the latest instant that the remote data is expected to cover.
///
/// Day-ahead rates are published in the afternoon: before the publication hour
/// the rates are known until the horizon hour today, afterwards until the horizon hour
/// tomorrow. Consumption lags behind, so its horizon is the local midnight.
#[must_use]
#[derive(Copy, Clone, Debug, bon::Builder)]
pub struct HorizonRule {
    #[builder(default = chrono_tz::Europe::London)]
    pub time_zone: Tz,

    #[builder(default = 16)]
    pub publication_hour: u32,

    #[builder(default = 23)]
    pub horizon_hour: u32,
}

impl Default for HorizonRule {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HorizonRule {
    #[must_use]
    pub fn rates(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.time_zone);
        let today = local.date_naive();
        let date = if local.hour() < self.publication_hour {
            today
        } else {
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        };
        self.local_instant(date, self.horizon_hour)
    }

    #[must_use]
    pub fn consumption(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.local_midnight(now.with_timezone(&self.time_zone).date_naive())
    }

    #[must_use]
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.local_instant(date, 0)
    }

    fn local_instant(&self, date: NaiveDate, hour: u32) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN));
        naive
            .and_local_timezone(self.time_zone)
            .earliest()
            .map_or_else(|| naive.and_utc(), |instant| instant.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_rates_winter() {
        let rule = HorizonRule::default();
        assert_eq!(rule.rates(utc(1, 15, 10, 0)), utc(1, 15, 23, 0));
        assert_eq!(rule.rates(utc(1, 15, 16, 0)), utc(1, 16, 23, 0));
    }

    #[test]
    fn test_rates_summer() {
        let rule = HorizonRule::default();
        // 15:00 BST.
        assert_eq!(rule.rates(utc(7, 15, 14, 0)), utc(7, 15, 22, 0));
        // 16:30 BST.
        assert_eq!(rule.rates(utc(7, 15, 15, 30)), utc(7, 16, 22, 0));
    }

    #[test]
    fn test_consumption() {
        let rule = HorizonRule::default();
        assert_eq!(rule.consumption(utc(1, 15, 10, 0)), utc(1, 15, 0, 0));
        assert_eq!(rule.consumption(utc(7, 15, 10, 0)), utc(7, 14, 23, 0));
    }
}
