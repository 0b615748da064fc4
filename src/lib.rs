//! Half-hourly electricity tariff ledger.
//!
//! Keeps a local copy of the unit rates, standing charges, and metered consumption of an
//! Octopus-style REST API, and prices the consumption over arbitrary periods, including
//! periods that span tariff switches.

pub mod api;
pub mod core;
pub mod cost;
pub mod db;
pub mod error;
pub mod ledger;
mod prelude;
pub mod quantity;
pub mod sync;
