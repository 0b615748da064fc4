use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use clap::Parser;
use reqwest::Url;
use tariff_ledger::{
    api::octopus::{self, MeterPoint, PaymentMethod},
    core::horizon::HorizonRule,
    db::Db,
    ledger::{Ledger, Settings},
};

/// Store, remote, and engine settings shared by the commands.
#[derive(Parser)]
pub struct LedgerArgs {
    /// Directory of the persisted store. In-memory when omitted.
    #[clap(long = "db-path", env = "DB_PATH")]
    db_path: Option<PathBuf>,

    #[clap(long = "api-base-url", env = "OCTOPUS_API_BASE_URL", default_value = octopus::DEFAULT_BASE_URL)]
    base_url: Url,

    /// Required for the consumption.
    #[clap(long = "api-key", env = "OCTOPUS_API_KEY")]
    api_key: Option<String>,

    /// Meter point administration number.
    #[clap(long, env = "OCTOPUS_MPAN", requires = "meter_serial")]
    mpan: Option<String>,

    #[clap(long = "meter-serial", env = "OCTOPUS_METER_SERIAL", requires = "mpan")]
    meter_serial: Option<String>,

    #[clap(long = "payment-method", env = "OCTOPUS_PAYMENT_METHOD", value_enum, default_value = "direct-debit")]
    payment_method: PaymentMethod,

    #[clap(long = "time-zone", env = "TIME_ZONE", default_value = "Europe/London")]
    time_zone: Tz,

    /// Wait this long after a failed sync before syncing the same series again.
    #[clap(long, env = "SYNC_COOLDOWN", default_value = "5m")]
    cooldown: humantime::Duration,

    /// Keep the manual-plan calculations in the store too.
    #[clap(long = "persist-manual-results", env = "PERSIST_MANUAL_RESULTS")]
    persist_manual_results: bool,
}

impl LedgerArgs {
    pub async fn build(&self) -> anyhow::Result<Ledger> {
        let db = match &self.db_path {
            Some(path) => Db::open(path).await.with_context(|| format!("failed to open `{}`", path.display()))?,
            None => Db::in_memory(),
        };
        let meter_point = self
            .mpan
            .clone()
            .zip(self.meter_serial.clone())
            .map(|(mpan, serial_number)| MeterPoint { mpan, serial_number });
        let api = octopus::Api::builder()
            .base_url(self.base_url.clone())
            .maybe_api_key(self.api_key.clone())
            .maybe_meter_point(meter_point)
            .payment_method(self.payment_method)
            .build()?;
        let settings = Settings::builder()
            .horizon_rule(self.horizon_rule())
            .cooldown(TimeDelta::from_std(self.cooldown.into()).context("the cooldown is too long")?)
            .persist_manual_results(self.persist_manual_results)
            .build();
        Ok(Ledger::new(db, Arc::new(api), settings))
    }

    /// Local midnight of the date.
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.horizon_rule().local_midnight(date)
    }

    fn horizon_rule(&self) -> HorizonRule {
        HorizonRule::builder().time_zone(self.time_zone).build()
    }
}
