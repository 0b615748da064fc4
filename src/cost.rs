//! Cost over a period, from the locally cached consumption, rates, and standing charges.

mod account;
mod aggregator;
mod cache;
mod totals;

pub use self::{
    account::{Agreement, split_by_agreements},
    aggregator::{Aggregator, ManualPlan, Pricing},
    cache::CalculationCache,
    totals::Totals,
};

/// Tariff code that manual-plan calculations are stored under.
pub const MANUAL_TARIFF_CODE: &str = "MANUAL";

/// Tariff code of the account-wide calculations that span tariff switches.
pub const ACCOUNT_TARIFF_CODE: &str = "ACCOUNT_ACTUAL";
