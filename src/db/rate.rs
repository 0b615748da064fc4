use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::{Record, Tables, Timed},
    quantity::rate::KilowattHourRate,
};

/// Unit rate of a tariff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateInterval {
    pub tariff_code: String,
    pub valid_from: DateTime<Utc>,

    /// Fixed tariffs publish open-ended rates.
    pub valid_to: Option<DateTime<Utc>>,

    pub value_excl_tax: KilowattHourRate,
    pub value_incl_tax: KilowattHourRate,
}

impl Record for RateInterval {
    type Key = (String, DateTime<Utc>);

    const TABLE: &'static str = "rates";

    fn key(&self) -> Self::Key {
        (self.tariff_code.clone(), self.valid_from)
    }

    fn rows(tables: &Tables) -> &BTreeMap<Self::Key, Self> {
        &tables.rates
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Key, Self> {
        &mut tables.rates
    }
}

impl Timed for RateInterval {
    fn start(&self) -> DateTime<Utc> {
        self.valid_from
    }

    fn end(&self) -> Option<DateTime<Utc>> {
        self.valid_to
    }

    fn tariff_code(&self) -> Option<&str> {
        Some(&self.tariff_code)
    }
}
