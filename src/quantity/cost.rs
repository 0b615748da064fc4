use std::fmt::{Debug, Display, Formatter};

use crate::quantity::{Quantity, energy::KilowattHours, rate::KilowattHourRate};

/// Pence.
pub type Cost = Quantity<0, 0, 1>;

impl Cost {
    /// Average rate over the energy, zero when there is no energy.
    #[must_use]
    pub fn per(self, energy: KilowattHours) -> KilowattHourRate {
        if energy.0 == 0.0 { KilowattHourRate::ZERO } else { Quantity(self.0 / energy.0) }
    }

    /// Convert to pounds for display.
    #[must_use]
    pub fn pounds(self) -> f64 {
        self.0 / 100.0
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "£{:.2}", self.pounds())
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}p", self.0)
    }
}
