//! Fee strategy library
//!
//! Each strategy is a pure function of a [`TransactionAggregate`] and the
//! configured amount. Configured amounts are cents for flat and per-item
//! strategies and basis points (100 = 1%) for the percentage strategy.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use paysettle_types::{FeeConfiguration, TransactionAggregate, MINOR_UNITS_PER_UNIT};

pub const TRANSACTION_FEE_KEY: &str = "transaction_fee";
pub const REFUND_FEE_KEY: &str = "refund_fee";
pub const CHARGEBACK_FEE_KEY: &str = "chargeback_fee";
pub const DECLINED_FEE_KEY: &str = "declined_fee";
pub const PAYOUT_FEE_KEY: &str = "payout_fee";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeStrategyKind {
    /// Basis points of EUR sales volume
    Percentage,
    /// Flat amount per application
    FixedFee,
    /// Per sale transaction
    TransactionBased,
    /// Per refund
    RefundFee,
    /// Per chargeback
    ChargebackFee,
    /// Per declined transaction
    DeclinedFee,
    /// Per payout
    PayoutFee,
}

impl FeeStrategyKind {
    /// Percentage wins regardless of key; unknown keys fall back to a flat fee
    pub fn select(is_percentage: bool, fee_key: &str) -> Self {
        if is_percentage {
            return Self::Percentage;
        }
        match fee_key {
            TRANSACTION_FEE_KEY => Self::TransactionBased,
            REFUND_FEE_KEY => Self::RefundFee,
            CHARGEBACK_FEE_KEY => Self::ChargebackFee,
            DECLINED_FEE_KEY => Self::DeclinedFee,
            PAYOUT_FEE_KEY => Self::PayoutFee,
            _ => Self::FixedFee,
        }
    }

    pub fn for_config(config: &FeeConfiguration) -> Self {
        Self::select(config.is_percentage, &config.key)
    }

    /// Compute the fee in EUR. `None` only on arithmetic overflow.
    pub fn calculate(&self, aggregate: &TransactionAggregate, configured_amount: i64) -> Option<Decimal> {
        match self {
            Self::Percentage => percentage_of(aggregate.total_sales_eur, configured_amount),
            Self::FixedFee => Some(per_unit(configured_amount)),
            Self::TransactionBased => per_item(configured_amount, aggregate.transaction_sales_count),
            Self::RefundFee => per_item(configured_amount, aggregate.refund_count),
            Self::ChargebackFee => per_item(configured_amount, aggregate.chargeback_count()),
            Self::DeclinedFee => per_item(configured_amount, aggregate.transaction_declined_count),
            Self::PayoutFee => per_item(configured_amount, aggregate.total_payout_count),
        }
    }

    /// Compute the fee in the block's own currency.
    ///
    /// Percentage fees apply to the original-currency sales total directly;
    /// every other strategy converts its own EUR figure with `rate`.
    pub fn calculate_original(
        &self,
        aggregate: &TransactionAggregate,
        configured_amount: i64,
        rate: Decimal,
    ) -> Option<Decimal> {
        match self {
            Self::Percentage => percentage_of(aggregate.total_sales_amount, configured_amount),
            _ => self.calculate(aggregate, configured_amount)?.checked_mul(rate),
        }
    }
}

fn per_unit(amount: i64) -> Decimal {
    Decimal::from(amount) / MINOR_UNITS_PER_UNIT
}

fn per_item(amount: i64, count: u64) -> Option<Decimal> {
    per_unit(amount).checked_mul(Decimal::from(count))
}

fn percentage_of(base: Decimal, basis_points: i64) -> Option<Decimal> {
    base.checked_mul(Decimal::from(basis_points) / dec!(10000))
}
