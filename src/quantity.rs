pub mod cost;
pub mod energy;
pub mod rate;

use std::ops::{Div, Mul};

use serde::{Deserialize, Serialize};

/// Dimension-tagged `f64`.
///
/// The const parameters are the exponents of energy, time, and money.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    PartialEq,
    PartialOrd,
    Serialize,
    derive_more::Add,
    derive_more::AddAssign,
    derive_more::From,
    derive_more::FromStr,
    derive_more::Neg,
    derive_more::Sub,
    derive_more::SubAssign,
    derive_more::Sum,
)]
#[serde(transparent)]
pub struct Quantity<const ENERGY: isize, const TIME: isize, const COST: isize>(pub f64);

impl<const ENERGY: isize, const TIME: isize, const COST: isize> Quantity<ENERGY, TIME, COST> {
    pub const ZERO: Self = Self(0.0);

    /// Check whether the two quantities differ by no more than `tolerance`.
    #[must_use]
    pub fn approx_eq(self, other: Self, tolerance: f64) -> bool {
        (self.0 - other.0).abs() <= tolerance
    }
}

impl<const ENERGY: isize, const TIME: isize, const COST: isize> Mul<f64>
    for Quantity<ENERGY, TIME, COST>
{
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl<const ENERGY: isize, const TIME: isize, const COST: isize> Div<f64>
    for Quantity<ENERGY, TIME, COST>
{
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}
