use chrono::{DateTime, Utc};

use crate::{
    db::{CalculationKey, CostCalculation},
    quantity::{cost::Cost, energy::KilowattHours},
};

/// Running sums of a cost calculation.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, derive_more::Add, derive_more::AddAssign)]
pub struct Totals {
    /// Priced consumption.
    pub total_kwh: KilowattHours,

    /// Raw consumption, priced or not.
    pub metered_kwh: KilowattHours,

    /// Consumption left out of `total_kwh` for the lack of a rate.
    pub unpriced_kwh: KilowattHours,

    /// Energy and standing costs together.
    pub cost_excl_tax: Cost,
    pub cost_incl_tax: Cost,

    pub standing_cost_excl_tax: Cost,
    pub standing_cost_incl_tax: Cost,
}

impl Totals {
    pub fn into_calculation(self, key: &CalculationKey, now: DateTime<Utc>) -> CostCalculation {
        CostCalculation {
            tariff_code: key.tariff_code.clone(),
            interval_type: key.interval_type,
            period_start: key.period.start,
            period_end: key.period.end,
            total_kwh: self.total_kwh,
            metered_kwh: self.metered_kwh,
            unpriced_kwh: self.unpriced_kwh,
            cost_excl_tax: self.cost_excl_tax,
            cost_incl_tax: self.cost_incl_tax,
            standing_cost_excl_tax: self.standing_cost_excl_tax,
            standing_cost_incl_tax: self.standing_cost_incl_tax,
            avg_rate_excl_tax: (self.cost_excl_tax - self.standing_cost_excl_tax).per(self.total_kwh),
            avg_rate_incl_tax: (self.cost_incl_tax - self.standing_cost_incl_tax).per(self.total_kwh),
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&CostCalculation> for Totals {
    fn from(calculation: &CostCalculation) -> Self {
        Self {
            total_kwh: calculation.total_kwh,
            metered_kwh: calculation.metered_kwh,
            unpriced_kwh: calculation.unpriced_kwh,
            cost_excl_tax: calculation.cost_excl_tax,
            cost_incl_tax: calculation.cost_incl_tax,
            standing_cost_excl_tax: calculation.standing_cost_excl_tax,
            standing_cost_incl_tax: calculation.standing_cost_incl_tax,
        }
    }
}
