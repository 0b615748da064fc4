use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};

use crate::{prelude::*, sync::SeriesKind};

type Key = (SeriesKind, Option<String>);

#[derive(Default)]
struct State {
    is_loading: bool,
    next_eligible_at: Option<DateTime<Utc>>,
}

/// Per-series, per-tariff loading flags and failure cooldowns.
#[derive(Default)]
pub struct Throttle(Mutex<HashMap<Key, State>>);

impl Throttle {
    /// Mark the series as loading, unless it already is or is cooling down.
    pub fn acquire(
        self: &Arc<Self>,
        series: SeriesKind,
        tariff_code: Option<String>,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<Permit> {
        let mut states = self.lock();
        let state = states.entry((series, tariff_code.clone())).or_default();
        if state.is_loading {
            return Err(Error::SyncInProgress { series, tariff: tariff_code });
        }
        if !force
            && let Some(until) = state.next_eligible_at
            && now < until
        {
            return Err(Error::CoolingDown { series, tariff: tariff_code, until });
        }
        state.is_loading = true;
        Ok(Permit { throttle: Arc::clone(self), key: (series, tariff_code), cool_down_until: None })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, State>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the loading flag when dropped, so a cancelled sync frees its slot.
#[must_use]
pub struct Permit {
    throttle: Arc<Throttle>,
    key: Key,
    cool_down_until: Option<DateTime<Utc>>,
}

impl Permit {
    pub const fn cool_down_until(&mut self, until: DateTime<Utc>) {
        self.cool_down_until = Some(until);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(state) = self.throttle.lock().get_mut(&self.key) {
            state.is_loading = false;
            state.next_eligible_at = self.cool_down_until;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    #[test]
    fn test_loading_flag_is_per_tariff() -> Result {
        let throttle = Arc::new(Throttle::default());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let _permit = throttle.acquire(SeriesKind::Rates, Some("A".into()), now, false)?;
        assert!(matches!(
            throttle.acquire(SeriesKind::Rates, Some("A".into()), now, false),
            Err(Error::SyncInProgress { .. })
        ));
        let _other = throttle.acquire(SeriesKind::Rates, Some("B".into()), now, false)?;
        Ok(())
    }

    #[test]
    fn test_cooldown() -> Result {
        let throttle = Arc::new(Throttle::default());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        {
            let mut permit = throttle.acquire(SeriesKind::Consumption, None, now, false)?;
            permit.cool_down_until(now + TimeDelta::minutes(5));
        }
        assert!(matches!(
            throttle.acquire(SeriesKind::Consumption, None, now + TimeDelta::minutes(1), false),
            Err(Error::CoolingDown { .. })
        ));
        drop(throttle.acquire(SeriesKind::Consumption, None, now + TimeDelta::minutes(1), true)?);
        let _permit = throttle.acquire(SeriesKind::Consumption, None, now + TimeDelta::minutes(6), false)?;
        Ok(())
    }
}
