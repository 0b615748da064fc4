//! In-memory provider for tests.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    api::{Page, Provider},
    db::{ConsumptionInterval, RateInterval, StandingCharge, Timed},
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
    sync::SeriesKind,
};

pub const PAGE_SIZE: usize = 100;

#[derive(Default)]
pub struct FakeProvider {
    rates: Mutex<Vec<RateInterval>>,
    standing_charges: Mutex<Vec<StandingCharge>>,
    consumption: Mutex<Vec<ConsumptionInterval>>,
    requests: Mutex<Vec<(SeriesKind, u32)>>,
    is_failing: AtomicBool,
}

impl FakeProvider {
    pub fn set_rates(&self, rates: Vec<RateInterval>) {
        *self.rates.lock().unwrap() = rates;
    }

    pub fn set_standing_charges(&self, standing_charges: Vec<StandingCharge>) {
        *self.standing_charges.lock().unwrap() = standing_charges;
    }

    pub fn set_consumption(&self, consumption: Vec<ConsumptionInterval>) {
        *self.consumption.lock().unwrap() = consumption;
    }

    pub fn set_failing(&self, is_failing: bool) {
        self.is_failing.store(is_failing, Ordering::Relaxed);
    }

    /// Page numbers requested for the series, in order.
    pub fn requested_pages(&self, series: SeriesKind) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == series)
            .map(|(_, page)| *page)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn serve<R: Timed>(
        &self,
        series: SeriesKind,
        records: &Mutex<Vec<R>>,
        tariff_code: Option<&str>,
        page: u32,
    ) -> Result<Page<R>> {
        self.requests.lock().unwrap().push((series, page));
        if self.is_failing.load(Ordering::Relaxed) {
            return Err(Error::InvalidUrl { url: "fake://failing".into() });
        }
        let mut records: Vec<R> = records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| tariff_code.is_none_or(|tariff_code| record.tariff_code() == Some(tariff_code)))
            .cloned()
            .collect();
        records.sort_by_key(|record| std::cmp::Reverse(record.start()));
        let count = records.len();
        let n_pages = count.div_ceil(PAGE_SIZE);
        let index = page as usize - 1;
        let results: Vec<R> = records.into_iter().skip(index * PAGE_SIZE).take(PAGE_SIZE).collect();
        Ok(Page::unfiltered(
            count,
            (index + 1 < n_pages).then(|| format!("?page={}", page + 1)),
            (page > 1).then(|| format!("?page={}", page - 1)),
            results,
        ))
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn unit_rates(&self, tariff_code: &str, page: u32) -> Result<Page<RateInterval>> {
        self.serve(SeriesKind::Rates, &self.rates, Some(tariff_code), page)
    }

    async fn standing_charges(&self, tariff_code: &str, page: u32) -> Result<Page<StandingCharge>> {
        self.serve(SeriesKind::StandingCharges, &self.standing_charges, Some(tariff_code), page)
    }

    async fn consumption(&self, page: u32) -> Result<Page<ConsumptionInterval>> {
        self.serve(SeriesKind::Consumption, &self.consumption, None, page)
    }
}

pub fn half_hours(since: DateTime<Utc>, n: usize) -> impl Iterator<Item = (DateTime<Utc>, DateTime<Utc>)> {
    (0..n).map(move |index| {
        let start = since + TimeDelta::minutes(30) * i32::try_from(index).unwrap();
        (start, start + TimeDelta::minutes(30))
    })
}

pub fn consumption(since: DateTime<Utc>, n: usize, kwh: f64) -> Vec<ConsumptionInterval> {
    half_hours(since, n)
        .map(|(interval_start, interval_end)| ConsumptionInterval {
            interval_start,
            interval_end,
            consumption: KilowattHours::from(kwh),
        })
        .collect()
}

pub fn rates(tariff_code: &str, since: DateTime<Utc>, n: usize, value: f64) -> Vec<RateInterval> {
    half_hours(since, n)
        .map(|(valid_from, valid_to)| RateInterval {
            tariff_code: tariff_code.to_owned(),
            valid_from,
            valid_to: Some(valid_to),
            value_excl_tax: KilowattHourRate::from(value),
            value_incl_tax: KilowattHourRate::from(value * 1.05),
        })
        .collect()
}

pub fn standing_charge(tariff_code: &str, since: DateTime<Utc>, value: f64) -> StandingCharge {
    StandingCharge {
        tariff_code: tariff_code.to_owned(),
        valid_from: since,
        valid_to: None,
        value_excl_tax: value.into(),
        value_incl_tax: (value * 1.05).into(),
    }
}
