mod client;
#[cfg(test)]
pub mod fake;
pub mod heartbeat;
pub mod octopus;
mod provider;

pub use self::provider::{Page, Provider};
