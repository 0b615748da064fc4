use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::Parser;
use serde::Deserialize;
use tariff_ledger::{
    cost::{Agreement, ManualPlan, Pricing},
    db::IntervalType,
    quantity::rate::{DailyRate, KilowattHourRate},
};

use crate::{
    cli::{heartbeat::HeartbeatArgs, ledger::LedgerArgs},
    tables::build_calculation_table,
};

#[derive(Parser)]
pub struct PeriodArgs {
    /// First local date of the period.
    #[clap(long)]
    from: NaiveDate,

    /// Local date right after the period.
    #[clap(long)]
    until: NaiveDate,

    #[clap(long = "interval-type", value_enum, default_value = "custom")]
    interval_type: IntervalType,
}

#[derive(Parser)]
pub struct CostArgs {
    #[clap(flatten)]
    ledger: LedgerArgs,

    #[clap(flatten)]
    period: PeriodArgs,

    #[clap(long = "tariff-code", env = "TARIFF_CODE", required_unless_present = "manual_rate")]
    tariff_code: Option<String>,

    /// Manual plan unit rate in pence per kilowatt-hour, instead of the tariff.
    #[clap(long = "manual-rate", conflicts_with = "tariff_code", requires = "manual_standing_charge")]
    manual_rate: Option<KilowattHourRate>,

    /// Manual plan standing charge in pence per day.
    #[clap(long = "manual-standing-charge", requires = "manual_rate")]
    manual_standing_charge: Option<DailyRate>,

    #[clap(flatten)]
    heartbeat: HeartbeatArgs,
}

impl CostArgs {
    pub async fn run(self) -> anyhow::Result<()> {
        let pricing = match (self.tariff_code, self.manual_rate, self.manual_standing_charge) {
            (Some(tariff_code), None, None) => Pricing::Tariff(tariff_code),
            (None, Some(rate), Some(standing_charge)) => Pricing::Manual(ManualPlan { rate, standing_charge }),
            _ => bail!("either a tariff code or a manual plan is expected"),
        };
        let ledger = self.ledger.build().await?;
        let calculation = ledger
            .compute_cost(
                &pricing,
                self.period.interval_type,
                self.ledger.midnight(self.period.from),
                self.ledger.midnight(self.period.until),
            )
            .await?;
        println!("{}", build_calculation_table(&calculation));
        self.heartbeat.send().await;
        Ok(())
    }
}

#[derive(Parser)]
pub struct AccountCostArgs {
    #[clap(flatten)]
    ledger: LedgerArgs,

    #[clap(flatten)]
    period: PeriodArgs,

    /// TOML file with the `[[agreements]]` of the account.
    #[clap(long, env = "AGREEMENTS_PATH", default_value = "agreements.toml")]
    agreements: PathBuf,

    #[clap(flatten)]
    heartbeat: HeartbeatArgs,
}

#[derive(Deserialize)]
struct AgreementsFile {
    agreements: Vec<Agreement>,
}

impl AccountCostArgs {
    pub async fn run(self) -> anyhow::Result<()> {
        let contents = std::fs::read_to_string(&self.agreements)
            .with_context(|| format!("failed to read `{}`", self.agreements.display()))?;
        let AgreementsFile { agreements } = toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", self.agreements.display()))?;

        let ledger = self.ledger.build().await?;
        let calculation = ledger
            .compute_cost_for_account(
                &agreements,
                self.period.interval_type,
                self.ledger.midnight(self.period.from),
                self.ledger.midnight(self.period.until),
            )
            .await?;
        println!("{}", build_calculation_table(&calculation));
        self.heartbeat.send().await;
        Ok(())
    }
}
