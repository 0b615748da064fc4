use std::{
    fmt::{Debug, Display, Formatter},
    ops::Mul,
};

use chrono::TimeDelta;

use crate::quantity::{Quantity, cost::Cost};

/// Pence per kilowatt-hour.
pub type KilowattHourRate = Quantity<-1, 0, 1>;

impl Display for KilowattHourRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4} p/kWh", self.0)
    }
}

impl Debug for KilowattHourRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}p/kWh", self.0)
    }
}

/// Pence per day, the unit standing charges are quoted in.
pub type DailyRate = Quantity<0, -1, 1>;

impl Display for DailyRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4} p/day", self.0)
    }
}

impl Debug for DailyRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}p/day", self.0)
    }
}

impl Mul<TimeDelta> for DailyRate {
    type Output = Cost;

    /// Pro-rate the daily charge over the duration.
    fn mul(self, rhs: TimeDelta) -> Self::Output {
        let hours = rhs.as_seconds_f64() / 3600.0;
        Quantity(self.0 * hours / 24.0)
    }
}
