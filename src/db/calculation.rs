use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    core::interval::Interval,
    db::{Record, Tables},
    quantity::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate},
};

/// Granularity the caller asked for. Only daily requests are strict about coverage.
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Custom,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct CalculationKey {
    pub tariff_code: String,
    pub interval_type: IntervalType,
    pub period: Interval,
}

/// Aggregated cost snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostCalculation {
    pub tariff_code: String,
    pub interval_type: IntervalType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    /// Priced consumption.
    pub total_kwh: KilowattHours,

    /// Everything the meter reported in the period, priced or not.
    pub metered_kwh: KilowattHours,

    /// Consumption that had no rate. Such a calculation is provisional until the rates arrive.
    #[serde(default)]
    pub unpriced_kwh: KilowattHours,

    pub cost_excl_tax: Cost,
    pub cost_incl_tax: Cost,
    pub standing_cost_excl_tax: Cost,
    pub standing_cost_incl_tax: Cost,
    pub avg_rate_excl_tax: KilowattHourRate,
    pub avg_rate_incl_tax: KilowattHourRate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CostCalculation {
    pub const fn period(&self) -> Interval {
        Interval::new(self.period_start, self.period_end)
    }
}

impl Record for CostCalculation {
    type Key = CalculationKey;

    const TABLE: &'static str = "calculations";

    fn key(&self) -> Self::Key {
        CalculationKey {
            tariff_code: self.tariff_code.clone(),
            interval_type: self.interval_type,
            period: self.period(),
        }
    }

    fn rows(tables: &Tables) -> &BTreeMap<Self::Key, Self> {
        &tables.calculations
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Key, Self> {
        &mut tables.calculations
    }
}
