//! Entry point for the callers: sync, cost, account cost, and cache control.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use enumset::EnumSet;
use tokio::sync::watch;

use crate::{
    api::Provider,
    core::{horizon::HorizonRule, interval::Interval},
    cost::{ACCOUNT_TARIFF_CODE, Agreement, Aggregator, CalculationCache, ManualPlan, Pricing, Totals, split_by_agreements},
    db::{CalculationKey, ConsumptionInterval, CostCalculation, Db, IntervalType, Query},
    prelude::*,
    quantity::energy::KilowattHours,
    sync::{Coverage, SeriesKind, SyncEngine, SyncOptions, SyncProgress},
};

/// Engine parameters, passed in explicitly.
#[must_use]
#[derive(Clone, Debug, bon::Builder)]
pub struct Settings {
    #[builder(default)]
    pub horizon_rule: HorizonRule,

    /// How long a failed series sync waits before it is retried automatically.
    #[builder(default = TimeDelta::minutes(5))]
    pub cooldown: TimeDelta,

    /// Metered total difference that still keeps a stored calculation valid.
    #[builder(default = KilowattHours::from(0.0001))]
    pub tolerance: KilowattHours,

    #[builder(default = 256)]
    pub high_water_mark: usize,

    #[builder(default = 192)]
    pub low_water_mark: usize,

    /// Store manual-plan calculations alongside the tariff ones.
    #[builder(default)]
    pub persist_manual_results: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone)]
pub struct Ledger {
    db: Db,
    sync: SyncEngine,
    aggregator: Aggregator,
    cache: Arc<CalculationCache>,
    persist_manual_results: bool,

    /// Plan that the in-process calculations were made with.
    manual_plan: Arc<Mutex<Option<ManualPlan>>>,
}

impl Ledger {
    pub fn new(db: Db, provider: Arc<dyn Provider>, settings: Settings) -> Self {
        let sync = SyncEngine::new(db.clone(), provider, settings.horizon_rule, settings.cooldown);
        let cache = CalculationCache::builder()
            .db(db.clone())
            .tolerance(settings.tolerance)
            .high_water_mark(settings.high_water_mark)
            .low_water_mark(settings.low_water_mark)
            .build();
        Self {
            aggregator: Aggregator::new(db.clone(), sync.clone()),
            db,
            sync,
            cache: Arc::new(cache),
            persist_manual_results: settings.persist_manual_results,
            manual_plan: Arc::default(),
        }
    }

    /// Sync all three series of the tariff, each on its own.
    ///
    /// Any stored change makes the in-process calculations stale, so they are dropped. A failed series
    /// may have committed some pages before failing, so it counts as a change too.
    pub async fn ensure_coverage(&self, tariff_code: &str, options: &SyncOptions) -> Vec<(SeriesKind, Result<Coverage>)> {
        let outcomes = self.sync.ensure_coverage(tariff_code, EnumSet::all(), options).await;
        if outcomes.iter().any(|(_, result)| match result {
            Ok(coverage) => coverage.summary.inserted + coverage.summary.updated != 0,
            Err(Error::CoolingDown { .. } | Error::SyncInProgress { .. }) => false,
            Err(_) => true,
        }) {
            self.cache.invalidate();
        }
        outcomes
    }

    /// Cost of the period under the pricing, cached.
    pub async fn compute_cost(
        &self,
        pricing: &Pricing,
        interval_type: IntervalType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CostCalculation> {
        let period = Interval::try_new(start, end)?;
        let is_persistable = match pricing {
            Pricing::Tariff(_) => true,
            Pricing::Manual(plan) => {
                self.switch_manual_plan(*plan);
                self.persist_manual_results
            }
        };
        self.cache
            .fetch_or_compute(pricing.key(interval_type, period), is_persistable, || {
                self.aggregator.compute(pricing, interval_type, period, Utc::now())
            })
            .await
    }

    /// Cost of the period across the tariff switches of the account, cached under the account code.
    ///
    /// Parts without consumption are skipped, but at least one part must have some.
    #[instrument(skip_all, fields(n_agreements = agreements.len()))]
    pub async fn compute_cost_for_account(
        &self,
        agreements: &[Agreement],
        interval_type: IntervalType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CostCalculation> {
        let period = Interval::try_new(start, end)?;
        let key = CalculationKey { tariff_code: ACCOUNT_TARIFF_CODE.to_owned(), interval_type, period };
        self.cache.fetch_or_compute(key.clone(), true, || self.sum_agreements(agreements, &key)).await
    }

    async fn sum_agreements(&self, agreements: &[Agreement], key: &CalculationKey) -> Result<CostCalculation> {
        let mut totals = Totals::default();
        let mut n_parts = 0;
        for (agreement, part) in split_by_agreements(agreements, key.period) {
            let pricing = Pricing::Tariff(agreement.tariff_code.clone());
            match self.compute_cost(&pricing, key.interval_type, part.start, part.end).await {
                Ok(calculation) => {
                    totals += Totals::from(&calculation);
                    n_parts += 1;
                }
                Err(error @ (Error::NoDataAvailable { .. } | Error::InsufficientData { .. })) => {
                    warn!(%agreement.tariff_code, ?part, "skipping: {error:#}");
                }
                Err(error) => return Err(error),
            }
        }
        if n_parts == 0 {
            return Err(Error::NoDataAvailable { period: key.period });
        }

        // Validity is checked against the whole period, including the parts outside any agreement.
        let period = key.period;
        totals.metered_kwh = self
            .db
            .consumption()
            .find(Query::filter(move |slot: &ConsumptionInterval| period.contains(slot.interval_start)))
            .await?
            .into_iter()
            .map(|slot| slot.consumption)
            .sum();
        info!(n_parts, %totals.cost_incl_tax, "summed the account");
        Ok(totals.into_calculation(key, Utc::now()))
    }

    /// Drop the in-process calculations.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// Drop all calculations, including the persisted ones.
    pub async fn reset_cache(&self) -> Result<usize> {
        self.cache.reset().await
    }

    pub fn progress(&self) -> watch::Receiver<SyncProgress> {
        self.sync.subscribe()
    }

    /// Calculations made with another manual plan are stale.
    fn switch_manual_plan(&self, plan: ManualPlan) {
        let previous = self.manual_plan.lock().unwrap_or_else(PoisonError::into_inner).replace(plan);
        if previous.is_some_and(|previous| previous != plan) {
            info!(?previous, ?plan, "manual plan changed");
            self.cache.invalidate();
        }
    }
}
