//! Two-tier store of computed calculations.
//!
//! The in-process tier is trusted until it is invalidated or trimmed. The persisted tier is
//! validated on every read by re-summing the metered consumption over the calculation's period:
//! if new consumption arrived since, the calculation is recomputed and overwritten in place.
//! A calculation that left some consumption unpriced is provisional and recomputed as well.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use itertools::Itertools;

use crate::{
    db::{CalculationKey, ConsumptionInterval, CostCalculation, Db, Query},
    prelude::*,
    quantity::energy::KilowattHours,
};

struct Entry {
    calculation: CostCalculation,
    touched_at: Instant,
}

pub struct CalculationCache {
    db: Db,
    tolerance: KilowattHours,
    high_water_mark: usize,
    low_water_mark: usize,
    memory: Mutex<HashMap<CalculationKey, Entry>>,
}

#[bon::bon]
impl CalculationCache {
    #[builder]
    pub fn new(
        db: Db,
        #[builder(default = KilowattHours::from(0.0001))] tolerance: KilowattHours,
        #[builder(default = 256)] high_water_mark: usize,
        #[builder(default = 192)] low_water_mark: usize,
    ) -> Self {
        Self {
            db,
            tolerance,
            high_water_mark,
            low_water_mark: low_water_mark.min(high_water_mark),
            memory: Mutex::default(),
        }
    }
}

impl CalculationCache {
    /// Return the cached calculation, or compute and cache a fresh one.
    ///
    /// Only persistable calculations go to the persisted tier.
    #[instrument(skip_all, fields(tariff_code = %key.tariff_code, period = ?key.period))]
    pub async fn fetch_or_compute<F, Fut>(
        &self,
        key: CalculationKey,
        is_persistable: bool,
        compute: F,
    ) -> Result<CostCalculation>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CostCalculation>>,
    {
        if let Some(calculation) = self.recall(&key) {
            trace!("in-memory hit");
            return Ok(calculation);
        }

        let stored = if is_persistable { self.db.calculations().get(&key).await? } else { None };
        if let Some(stored) = &stored
            && self.is_valid(stored).await?
        {
            debug!("persisted hit");
            self.remember(key, stored.clone());
            return Ok(stored.clone());
        }

        let mut calculation = compute().await?;
        if let Some(stored) = stored {
            info!(stale_kwh = %stored.metered_kwh, fresh_kwh = %calculation.metered_kwh, "recomputed a stale calculation");
            calculation.created_at = stored.created_at;
        }
        if is_persistable {
            self.db.calculations().upsert(vec![calculation.clone()]).await?;
        }
        self.remember(key, calculation.clone());
        Ok(calculation)
    }

    /// Forget the in-process tier.
    pub fn invalidate(&self) {
        let n_evicted = {
            let mut memory = self.lock();
            let n_evicted = memory.len();
            memory.clear();
            n_evicted
        };
        debug!(n_evicted, "invalidated");
    }

    /// Forget both tiers.
    pub async fn reset(&self) -> Result<usize> {
        self.invalidate();
        self.db.calculations().delete_all().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stored calculation is still valid while all its consumption is priced,
    /// and the metered total over its period stays the same.
    async fn is_valid(&self, calculation: &CostCalculation) -> Result<bool> {
        if !calculation.unpriced_kwh.approx_eq(KilowattHours::ZERO, self.tolerance.0) {
            debug!(%calculation.unpriced_kwh, "provisional calculation");
            return Ok(false);
        }
        let period = calculation.period();
        let metered_kwh: KilowattHours = self
            .db
            .consumption()
            .find(Query::filter(move |slot: &ConsumptionInterval| period.contains(slot.interval_start)))
            .await?
            .into_iter()
            .map(|slot| slot.consumption)
            .sum();
        Ok(metered_kwh.approx_eq(calculation.metered_kwh, self.tolerance.0))
    }

    fn recall(&self, key: &CalculationKey) -> Option<CostCalculation> {
        let mut memory = self.lock();
        let entry = memory.get_mut(key)?;
        entry.touched_at = Instant::now();
        Some(entry.calculation.clone())
    }

    fn remember(&self, key: CalculationKey, calculation: CostCalculation) {
        let mut memory = self.lock();
        memory.insert(key, Entry { calculation, touched_at: Instant::now() });
        if memory.len() > self.high_water_mark {
            let n_evicted = memory.len() - self.low_water_mark;
            let oldest: Vec<CalculationKey> = memory
                .iter()
                .sorted_unstable_by_key(|(_, entry)| entry.touched_at)
                .take(n_evicted)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &oldest {
                memory.remove(key);
            }
            debug!(n_evicted, "trimmed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CalculationKey, Entry>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
