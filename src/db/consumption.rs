use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    core::interval::Interval,
    db::{Record, Tables, Timed},
    quantity::energy::KilowattHours,
};

/// Metered consumption over one slot, normally half an hour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionInterval {
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    pub consumption: KilowattHours,
}

impl ConsumptionInterval {
    pub const fn interval(&self) -> Interval {
        Interval::new(self.interval_start, self.interval_end)
    }
}

impl Record for ConsumptionInterval {
    type Key = DateTime<Utc>;

    const TABLE: &'static str = "consumption";

    fn key(&self) -> Self::Key {
        self.interval_start
    }

    fn rows(tables: &Tables) -> &BTreeMap<Self::Key, Self> {
        &tables.consumption
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Key, Self> {
        &mut tables.consumption
    }
}

impl Timed for ConsumptionInterval {
    fn start(&self) -> DateTime<Utc> {
        self.interval_start
    }

    fn end(&self) -> Option<DateTime<Utc>> {
        Some(self.interval_end)
    }

    fn tariff_code(&self) -> Option<&str> {
        None
    }
}
