use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    api::{Page, Provider},
    core::horizon::HorizonRule,
    db::{ConsumptionInterval, RateInterval, StandingCharge, Timed},
    prelude::*,
};

#[derive(Debug, Hash, clap::ValueEnum, enumset::EnumSetType)]
pub enum SeriesKind {
    Rates,
    StandingCharges,
    Consumption,
}

/// Locally cached copy of a remote time series.
#[async_trait]
pub trait Series: Timed {
    const KIND: SeriesKind;

    /// Whether the series is fetched per tariff.
    const IS_PER_TARIFF: bool = true;

    async fn fetch(provider: &dyn Provider, tariff_code: &str, page: u32) -> Result<Page<Self>>;

    /// Latest instant the local copy is expected to reach.
    fn horizon(rule: &HorizonRule, now: DateTime<Utc>) -> DateTime<Utc>;

    /// Native distance between consecutive records, if there is one.
    fn cadence(tariff_code: &str) -> Option<TimeDelta>;

    /// Throttling and progress scope.
    fn scope(tariff_code: &str) -> Option<String> {
        Self::IS_PER_TARIFF.then(|| tariff_code.to_owned())
    }

    fn is_in_scope(&self, tariff_code: &str) -> bool {
        self.tariff_code().is_none_or(|code| code == tariff_code)
    }
}

#[async_trait]
impl Series for RateInterval {
    const KIND: SeriesKind = SeriesKind::Rates;

    async fn fetch(provider: &dyn Provider, tariff_code: &str, page: u32) -> Result<Page<Self>> {
        provider.unit_rates(tariff_code, page).await
    }

    fn horizon(rule: &HorizonRule, now: DateTime<Utc>) -> DateTime<Utc> {
        rule.rates(now)
    }

    /// Only the dynamic tariffs change their rate every half an hour.
    fn cadence(tariff_code: &str) -> Option<TimeDelta> {
        tariff_code.contains("AGILE").then(|| TimeDelta::minutes(30))
    }
}

#[async_trait]
impl Series for StandingCharge {
    const KIND: SeriesKind = SeriesKind::StandingCharges;

    async fn fetch(provider: &dyn Provider, tariff_code: &str, page: u32) -> Result<Page<Self>> {
        provider.standing_charges(tariff_code, page).await
    }

    /// A standing charge must cover the present.
    fn horizon(_rule: &HorizonRule, now: DateTime<Utc>) -> DateTime<Utc> {
        now
    }

    fn cadence(_tariff_code: &str) -> Option<TimeDelta> {
        None
    }
}

#[async_trait]
impl Series for ConsumptionInterval {
    const KIND: SeriesKind = SeriesKind::Consumption;
    const IS_PER_TARIFF: bool = false;

    async fn fetch(provider: &dyn Provider, _tariff_code: &str, page: u32) -> Result<Page<Self>> {
        provider.consumption(page).await
    }

    fn horizon(rule: &HorizonRule, now: DateTime<Utc>) -> DateTime<Utc> {
        rule.consumption(now)
    }

    fn cadence(_tariff_code: &str) -> Option<TimeDelta> {
        Some(TimeDelta::minutes(30))
    }
}
