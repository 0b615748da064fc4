use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    core::interval::Interval,
    cost::{MANUAL_TARIFF_CODE, Totals},
    db::{CalculationKey, ConsumptionInterval, CostCalculation, Db, IntervalType, Query, RateInterval, StandingCharge, Timed},
    prelude::*,
    quantity::{
        cost::Cost,
        rate::{DailyRate, KilowattHourRate},
    },
    sync::{Series, SyncEngine, SyncOptions},
};

/// Where the prices come from.
#[derive(Clone, Debug, PartialEq)]
pub enum Pricing {
    /// Rates and standing charges of the tariff.
    Tariff(String),

    /// User-supplied constants.
    Manual(ManualPlan),
}

impl Pricing {
    #[must_use]
    pub fn tariff_code(&self) -> &str {
        match self {
            Self::Tariff(tariff_code) => tariff_code,
            Self::Manual(_) => MANUAL_TARIFF_CODE,
        }
    }

    /// Manual calculations are keyed by the plan constants, one plan never sees the results of another.
    #[must_use]
    pub fn key(&self, interval_type: IntervalType, period: Interval) -> CalculationKey {
        let tariff_code = match self {
            Self::Tariff(tariff_code) => tariff_code.clone(),
            Self::Manual(plan) => format!("{MANUAL_TARIFF_CODE}:{}:{}", plan.rate.0, plan.standing_charge.0),
        };
        CalculationKey { tariff_code, interval_type, period }
    }
}

/// Flat plan, with both constants already in the tax treatment the user wants to see.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualPlan {
    pub rate: KilowattHourRate,
    pub standing_charge: DailyRate,
}

#[derive(Clone)]
pub struct Aggregator {
    db: Db,
    sync: SyncEngine,
}

impl Aggregator {
    pub const fn new(db: Db, sync: SyncEngine) -> Self {
        Self { db, sync }
    }

    /// Merge consumption with the prices over the period.
    ///
    /// The calculation is built entirely in memory, nothing is written here.
    #[instrument(skip_all, fields(tariff_code = pricing.tariff_code(), interval_type = ?interval_type))]
    pub async fn compute(
        &self,
        pricing: &Pricing,
        interval_type: IntervalType,
        period: Interval,
        now: DateTime<Utc>,
    ) -> Result<CostCalculation> {
        let key = pricing.key(interval_type, period);
        let priced_period =
            if interval_type == IntervalType::Daily { self.clip_to_available(period).await? } else { period };

        let consumption = self
            .db
            .consumption()
            .find(Query::filter(move |slot: &ConsumptionInterval| priced_period.contains(slot.interval_start)))
            .await?;
        if consumption.is_empty() {
            return Err(Error::NoDataAvailable { period });
        }

        let prices = match pricing {
            Pricing::Tariff(tariff_code) => Prices::Tariff {
                rates: self.load_or_fill(tariff_code, priced_period, now).await?,
                standing_charges: self.load_or_fill(tariff_code, priced_period, now).await?,
            },
            Pricing::Manual(plan) => Prices::Manual(*plan),
        };

        let mut totals = Totals::default();
        let mut n_unpriced_slots = 0_usize;
        let mut n_uncharged_slots = 0_usize;
        for slot in &consumption {
            totals.metered_kwh += slot.consumption;
            let Some(priced_slot) = slot.interval().intersect(priced_period) else {
                continue;
            };
            let fraction = priced_slot.duration().as_seconds_f64() / slot.interval().duration().as_seconds_f64();
            let energy = slot.consumption * fraction;

            match prices.rate_at(priced_slot) {
                Some(rate) => {
                    totals.total_kwh += energy;
                    totals.cost_excl_tax += energy * rate.excl_tax;
                    totals.cost_incl_tax += energy * rate.incl_tax;
                }
                None => {
                    n_unpriced_slots += 1;
                    totals.unpriced_kwh += energy;
                }
            }
            match prices.standing_cost_of(priced_slot, fraction) {
                Some(standing_cost) => {
                    totals.standing_cost_excl_tax += standing_cost.excl_tax;
                    totals.standing_cost_incl_tax += standing_cost.incl_tax;
                    totals.cost_excl_tax += standing_cost.excl_tax;
                    totals.cost_incl_tax += standing_cost.incl_tax;
                }
                None => n_uncharged_slots += 1,
            }
        }

        if n_unpriced_slots != 0 {
            warn!(n_unpriced_slots, %totals.unpriced_kwh, "no matching rate, the consumption is left out of the total");
        }
        if n_uncharged_slots != 0 {
            warn!(n_uncharged_slots, "no matching standing charge");
        }
        let calculation = totals.into_calculation(&key, now);
        debug!(
            n_slots = consumption.len(),
            %calculation.total_kwh,
            %calculation.cost_incl_tax,
            "aggregated",
        );
        Ok(calculation)
    }

    /// Strict requests are narrowed down to the locally available consumption.
    async fn clip_to_available(&self, requested: Interval) -> Result<Interval> {
        let Some(extent) = self.db.consumption().extent(|_| true).await? else {
            return Err(Error::NoDataAvailable { period: requested });
        };
        let available = Interval::new(extent.min_start, extent.max_end.unwrap_or(extent.max_start));
        let clipped = available.intersect(requested).ok_or(Error::InsufficientData { available, requested })?;
        if clipped != requested {
            warn!(?available, ?requested, "clipping to the available consumption");
        }
        Ok(clipped)
    }

    /// Load the tariff's records overlapping the period, syncing the series first when there are none.
    async fn load_or_fill<S: Series>(&self, tariff_code: &str, period: Interval, now: DateTime<Utc>) -> Result<Vec<S>> {
        let records = self.load::<S>(tariff_code, period).await?;
        if !records.is_empty() {
            return Ok(records);
        }
        info!(series = ?S::KIND, "nothing stored locally, fetching…");
        match self.sync.ensure_series::<S>(tariff_code, &SyncOptions::builder().now(now).build()).await {
            Ok(_) => {}
            Err(error @ (Error::CoolingDown { .. } | Error::SyncInProgress { .. })) => {
                warn!("not fetching: {error:#}");
            }
            Err(error) => return Err(error),
        }
        self.load::<S>(tariff_code, period).await
    }

    async fn load<S: Series>(&self, tariff_code: &str, period: Interval) -> Result<Vec<S>> {
        let tariff_code = tariff_code.to_owned();
        self.db
            .table::<S>()
            .find(Query::filter(move |record: &S| {
                record.tariff_code() == Some(tariff_code.as_str())
                    && record.start() < period.end
                    && record.end().is_none_or(|end| end > period.start)
            }))
            .await
    }
}

#[derive(Copy, Clone)]
struct Taxed<T> {
    excl_tax: T,
    incl_tax: T,
}

enum Prices {
    Tariff { rates: Vec<RateInterval>, standing_charges: Vec<StandingCharge> },
    Manual(ManualPlan),
}

impl Prices {
    fn rate_at(&self, slot: Interval) -> Option<Taxed<KilowattHourRate>> {
        match self {
            Self::Tariff { rates, .. } => in_force_at(rates, slot.midpoint())
                .map(|rate| Taxed { excl_tax: rate.value_excl_tax, incl_tax: rate.value_incl_tax }),
            Self::Manual(plan) => Some(Taxed { excl_tax: plan.rate, incl_tax: plan.rate }),
        }
    }

    /// Standing charge pro-rated over the slot.
    fn standing_cost_of(&self, slot: Interval, fraction: f64) -> Option<Taxed<Cost>> {
        match self {
            Self::Tariff { standing_charges, .. } => {
                in_force_at(standing_charges, slot.midpoint()).map(|charge| Taxed {
                    excl_tax: charge.value_excl_tax * slot.duration(),
                    incl_tax: charge.value_incl_tax * slot.duration(),
                })
            }
            Self::Manual(plan) => {
                // Manual plans assume half-hour slots.
                let cost = Cost::from(plan.standing_charge.0 / 48.0) * fraction;
                Some(Taxed { excl_tax: cost, incl_tax: cost })
            }
        }
    }
}

/// The latest-starting record that covers the instant.
///
/// The records must be sorted by their start.
fn in_force_at<R: Timed>(records: &[R], instant: DateTime<Utc>) -> Option<&R> {
    let n_started = records.partition_point(|record| record.start() <= instant);
    records[..n_started].iter().rev().find(|record| record.covers(instant))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{
        api::{
            Provider,
            fake::{self, FakeProvider},
        },
        core::horizon::HorizonRule,
        sync::SeriesKind,
    };

    const TARIFF: &str = "E-1R-AGILE-24-10-01-C";

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    fn day(day: u32) -> Interval {
        Interval::new(at(day, 0, 0), at(day, 0, 0) + TimeDelta::days(1))
    }

    fn setup() -> (Arc<FakeProvider>, Db, Aggregator) {
        let provider = Arc::new(FakeProvider::default());
        let db = Db::in_memory();
        let sync = SyncEngine::new(
            db.clone(),
            Arc::clone(&provider) as Arc<dyn Provider>,
            HorizonRule::default(),
            TimeDelta::minutes(5),
        );
        (provider, db.clone(), Aggregator::new(db, sync))
    }

    fn open_ended_rate(valid_from: DateTime<Utc>, value: f64) -> RateInterval {
        RateInterval {
            tariff_code: TARIFF.to_owned(),
            valid_from,
            valid_to: None,
            value_excl_tax: KilowattHourRate::from(value),
            value_incl_tax: KilowattHourRate::from(value),
        }
    }

    #[tokio::test]
    async fn test_constant_rate_conserves_cost() -> Result {
        let (provider, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 48, 0.25)).await?;
        provider.set_rates(fake::rates(TARIFF, at(1, 0, 0), 48, 20.0));

        let pricing = Pricing::Tariff(TARIFF.to_owned());
        let calculation = aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await?;
        assert_abs_diff_eq!(calculation.total_kwh.0, 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.cost_excl_tax.0, calculation.total_kwh.0 * 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.cost_incl_tax.0, 12.0 * 21.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.avg_rate_excl_tax.0, 20.0, epsilon = 1e-9);
        assert_eq!(calculation.standing_cost_excl_tax, Cost::ZERO);
        assert_eq!(calculation.tariff_code, TARIFF);
        assert_eq!(calculation.period(), day(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_lazy_fill() -> Result {
        let (provider, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 48, 0.25)).await?;
        provider.set_rates(fake::rates(TARIFF, at(1, 0, 0), 48, 20.0));

        let pricing = Pricing::Tariff(TARIFF.to_owned());
        aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await?;
        assert_eq!(db.rates().count(|_| true).await?, 48);
        assert_eq!(provider.requested_pages(SeriesKind::Rates), vec![1]);
        assert_eq!(provider.requested_pages(SeriesKind::StandingCharges), vec![1]);

        // Local rates are enough the second time.
        provider.clear_requests();
        aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await?;
        assert!(provider.requested_pages(SeriesKind::Rates).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_lazy_fill_follows_the_calculation_clock() -> Result {
        let (provider, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 48, 0.25)).await?;
        let pricing = Pricing::Tariff(TARIFF.to_owned());

        provider.set_failing(true);
        assert!(aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await.is_err());
        provider.set_failing(false);
        provider.set_rates(fake::rates(TARIFF, at(1, 0, 0), 48, 20.0));

        // Still cooling down a minute later: priced without rates.
        provider.clear_requests();
        let calculation = aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 1)).await?;
        assert!(provider.requested_pages(SeriesKind::Rates).is_empty());
        assert_abs_diff_eq!(calculation.unpriced_kwh.0, 12.0, epsilon = 1e-9);

        // Ten minutes later the cooldown is over.
        let calculation = aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 10)).await?;
        assert_eq!(provider.requested_pages(SeriesKind::Rates), vec![1]);
        assert_abs_diff_eq!(calculation.total_kwh.0, 12.0, epsilon = 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_standing_charge_pro_rates_to_the_day() -> Result {
        let (provider, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 48, 0.25)).await?;
        provider.set_rates(fake::rates(TARIFF, at(1, 0, 0), 48, 20.0));
        provider.set_standing_charges(vec![fake::standing_charge(TARIFF, at(1, 0, 0) - TimeDelta::days(30), 61.64)]);

        let pricing = Pricing::Tariff(TARIFF.to_owned());
        let calculation = aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await?;
        assert_abs_diff_eq!(calculation.standing_cost_excl_tax.0, 61.64, epsilon = 1e-6);
        assert_abs_diff_eq!(calculation.cost_excl_tax.0, 240.0 + 61.64, epsilon = 1e-6);
        assert_abs_diff_eq!(calculation.avg_rate_excl_tax.0, 20.0, epsilon = 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_latest_rate_wins() -> Result {
        let (_, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 48, 0.25)).await?;
        db.rates().upsert(vec![open_ended_rate(at(1, 0, 0) - TimeDelta::days(31), 10.0), open_ended_rate(at(1, 12, 0), 30.0)]).await?;

        let pricing = Pricing::Tariff(TARIFF.to_owned());
        let calculation = aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await?;
        assert_abs_diff_eq!(calculation.cost_excl_tax.0, 6.0 * 10.0 + 6.0 * 30.0, epsilon = 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_unpriced_slots_are_excluded() -> Result {
        let (provider, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 48, 0.25)).await?;
        provider.set_rates(fake::rates(TARIFF, at(1, 0, 0), 40, 20.0));

        let pricing = Pricing::Tariff(TARIFF.to_owned());
        let calculation = aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await?;
        assert_abs_diff_eq!(calculation.total_kwh.0, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.metered_kwh.0, 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.unpriced_kwh.0, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.cost_excl_tax.0, 200.0, epsilon = 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_last_slot_is_clipped() -> Result {
        let (_, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 4, 0.25)).await?;
        let pricing = Pricing::Manual(ManualPlan { rate: KilowattHourRate::from(20.0), standing_charge: DailyRate::ZERO });

        let period = Interval::new(at(1, 0, 0), at(1, 0, 45));
        let calculation = aggregator.compute(&pricing, IntervalType::Custom, period, at(2, 0, 0)).await?;
        assert_abs_diff_eq!(calculation.total_kwh.0, 0.375, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.metered_kwh.0, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.cost_excl_tax.0, 7.5, epsilon = 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_manual_plan() -> Result {
        let (provider, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 48, 0.25)).await?;
        let pricing = Pricing::Manual(ManualPlan { rate: KilowattHourRate::from(25.0), standing_charge: DailyRate::from(48.0) });

        let calculation = aggregator.compute(&pricing, IntervalType::Custom, day(1), at(2, 0, 0)).await?;
        assert_eq!(calculation.tariff_code, "MANUAL:25:48");
        assert_abs_diff_eq!(calculation.standing_cost_excl_tax.0, 48.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.cost_excl_tax.0, 12.0 * 25.0 + 48.0, epsilon = 1e-9);
        assert_eq!(calculation.cost_excl_tax, calculation.cost_incl_tax);
        assert!(provider.requested_pages(SeriesKind::Rates).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_request_is_clipped_to_available_consumption() -> Result {
        let (_, db, aggregator) = setup();
        db.consumption().upsert(fake::consumption(at(1, 0, 0), 24, 0.25)).await?;
        let pricing = Pricing::Manual(ManualPlan { rate: KilowattHourRate::from(20.0), standing_charge: DailyRate::from(48.0) });

        let calculation = aggregator.compute(&pricing, IntervalType::Daily, day(1), at(2, 0, 0)).await?;
        assert_eq!(calculation.period(), day(1));
        assert_abs_diff_eq!(calculation.total_kwh.0, 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(calculation.standing_cost_excl_tax.0, 24.0, epsilon = 1e-9);

        assert!(matches!(
            aggregator.compute(&pricing, IntervalType::Daily, day(5), at(6, 0, 0)).await,
            Err(Error::InsufficientData { .. })
        ));
        assert!(matches!(
            aggregator.compute(&pricing, IntervalType::Custom, day(5), at(6, 0, 0)).await,
            Err(Error::NoDataAvailable { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_consumption() {
        let (_, _, aggregator) = setup();
        let pricing = Pricing::Tariff(TARIFF.to_owned());
        assert!(matches!(
            aggregator.compute(&pricing, IntervalType::Daily, day(1), at(2, 0, 0)).await,
            Err(Error::NoDataAvailable { .. })
        ));
    }

    #[test]
    fn test_in_force_at_is_half_open() {
        let rates = vec![open_ended_rate(at(1, 0, 0), 10.0)];
        assert!(in_force_at(&rates, at(1, 0, 0)).is_some());
        assert!(in_force_at(&rates, at(1, 0, 0) - TimeDelta::seconds(1)).is_none());

        let mut closed = open_ended_rate(at(1, 0, 0), 10.0);
        closed.valid_to = Some(at(1, 0, 30));
        assert!(in_force_at(&[closed.clone()], at(1, 0, 30)).is_none());
        assert!(in_force_at(&[closed], at(1, 0, 15)).is_some());
    }
}
