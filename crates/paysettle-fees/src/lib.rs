//! PaySettle Fee Engine
//!
//! Configurable merchant fees computed per settlement period.
//!
//! # Strategies
//!
//! | Strategy         | Selected by              | Formula                              |
//! |------------------|--------------------------|--------------------------------------|
//! | Percentage       | `is_percentage`          | EUR sales x amount / 10000           |
//! | TransactionBased | `transaction_fee`        | amount / 100 x sale count            |
//! | RefundFee        | `refund_fee`             | amount / 100 x refund count          |
//! | ChargebackFee    | `chargeback_fee`         | amount / 100 x chargeback count      |
//! | DeclinedFee      | `declined_fee`           | amount / 100 x declined count        |
//! | PayoutFee        | `payout_fee`             | amount / 100 x payout count          |
//! | FixedFee         | any other key            | amount / 100                         |

pub mod condition;
pub mod engine;
pub mod frequency;
pub mod registry;
pub mod strategy;

use thiserror::Error;

pub use engine::{partition_outcomes, FeeContext, FeeEngine, FeeOutcome};
pub use frequency::{AlwaysApply, FrequencyGate, HistoryFrequencyGate};
pub use registry::FeeRegistry;
pub use strategy::*;

/// Errors confined to a single fee configuration
#[derive(Debug, Clone, Error)]
pub enum FeeError {
    #[error("Malformed condition on fee {fee_key}: {reason}")]
    MalformedCondition { fee_key: String, reason: String },

    #[error("Frequency check failed for fee {fee_key}: {reason}")]
    FrequencyCheck { fee_key: String, reason: String },

    #[error("Fee {fee_key} overflowed during calculation")]
    Overflow { fee_key: String },
}

impl FeeError {
    /// Key of the fee configuration that failed
    pub fn fee_key(&self) -> &str {
        match self {
            Self::MalformedCondition { fee_key, .. }
            | Self::FrequencyCheck { fee_key, .. }
            | Self::Overflow { fee_key } => fee_key,
        }
    }
}

pub type FeeResult<T> = Result<T, FeeError>;
