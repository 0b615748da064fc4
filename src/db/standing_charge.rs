use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::{Record, Tables, Timed},
    quantity::rate::DailyRate,
};

/// Daily standing charge of a tariff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandingCharge {
    pub tariff_code: String,
    pub valid_from: DateTime<Utc>,

    /// `None` for the current, open-ended charge.
    pub valid_to: Option<DateTime<Utc>>,

    pub value_excl_tax: DailyRate,
    pub value_incl_tax: DailyRate,
}

impl Record for StandingCharge {
    type Key = (String, DateTime<Utc>);

    const TABLE: &'static str = "standing_charges";

    fn key(&self) -> Self::Key {
        (self.tariff_code.clone(), self.valid_from)
    }

    fn rows(tables: &Tables) -> &BTreeMap<Self::Key, Self> {
        &tables.standing_charges
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Key, Self> {
        &mut tables.standing_charges
    }
}

impl Timed for StandingCharge {
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
