//! Money helpers
//!
//! Ledger rows (reserve entries, chargebacks) persist integer minor units.
//! Settlement figures are computed in `Decimal` currency units so rounding
//! only ever happens at the boundary where a figure is stored.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, Sub};

use crate::{Result, SettlementError};

/// Minor units per currency unit (cents per euro)
pub const MINOR_UNITS_PER_UNIT: Decimal = Decimal::ONE_HUNDRED;

/// Convert integer minor units into currency units
pub fn minor_to_units(minor: i64) -> Decimal {
    Decimal::from(minor) / MINOR_UNITS_PER_UNIT
}

/// Convert currency units into integer minor units, rounding half away from zero
pub fn units_to_minor(units: Decimal) -> Result<i64> {
    let scaled = units
        .checked_mul(MINOR_UNITS_PER_UNIT)
        .ok_or(SettlementError::AmountOverflow)?;
    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(SettlementError::AmountOverflow)
}

/// A figure in the block's original currency together with its EUR twin.
///
/// Both sides are always computed from their own inputs; one is never
/// derived from the other by an exchange rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyPair {
    pub original: Decimal,
    pub eur: Decimal,
}

impl MoneyPair {
    pub fn new(original: Decimal, eur: Decimal) -> Self {
        Self { original, eur }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Build a pair from two minor-unit amounts
    pub fn from_minor(original: i64, eur: i64) -> Self {
        Self {
            original: minor_to_units(original),
            eur: minor_to_units(eur),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.original.is_zero() && self.eur.is_zero()
    }
}

impl Add for MoneyPair {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            original: self.original + rhs.original,
            eur: self.eur + rhs.eur,
        }
    }
}

impl Sub for MoneyPair {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            original: self.original - rhs.original,
            eur: self.eur - rhs.eur,
        }
    }
}

impl Sum for MoneyPair {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, pair| acc + pair)
    }
}
