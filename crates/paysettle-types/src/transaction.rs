//! Transaction aggregates
//!
//! A [`TransactionAggregate`] is the per-period, per-currency rollup an
//! external collector hands to the settlement core. It is read-only input.
//! Monetary totals are currency units; counts that are absent from a
//! serialized aggregate read as zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, Result, SettlementError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAggregate {
    /// Currency of the block this aggregate belongs to
    pub currency: Currency,

    #[serde(default)]
    pub total_sales_amount: Decimal,
    #[serde(default)]
    pub total_sales_eur: Decimal,
    #[serde(default)]
    pub transaction_sales_count: u64,

    #[serde(default)]
    pub total_refunds_amount: Decimal,
    #[serde(default)]
    pub total_refunds_eur: Decimal,
    #[serde(default)]
    pub refund_count: u64,

    #[serde(default)]
    pub chargeback_processing_amount: Decimal,
    #[serde(default)]
    pub chargeback_processing_eur: Decimal,
    #[serde(default)]
    pub chargeback_processing_count: u64,

    #[serde(default)]
    pub chargeback_approved_amount: Decimal,
    #[serde(default)]
    pub chargeback_approved_eur: Decimal,
    #[serde(default)]
    pub chargeback_approved_count: u64,

    #[serde(default)]
    pub transaction_declined_count: u64,
    #[serde(default)]
    pub total_payout_count: u64,

    /// Units of `currency` per 1 EUR
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
}

impl TransactionAggregate {
    /// An empty aggregate for a currency
    pub fn empty(currency: Currency) -> Self {
        Self {
            currency,
            total_sales_amount: Decimal::ZERO,
            total_sales_eur: Decimal::ZERO,
            transaction_sales_count: 0,
            total_refunds_amount: Decimal::ZERO,
            total_refunds_eur: Decimal::ZERO,
            refund_count: 0,
            chargeback_processing_amount: Decimal::ZERO,
            chargeback_processing_eur: Decimal::ZERO,
            chargeback_processing_count: 0,
            chargeback_approved_amount: Decimal::ZERO,
            chargeback_approved_eur: Decimal::ZERO,
            chargeback_approved_count: 0,
            transaction_declined_count: 0,
            total_payout_count: 0,
            exchange_rate: if currency.is_eur() { Some(Decimal::ONE) } else { None },
        }
    }

    /// Chargebacks still in flight plus chargebacks approved in the period
    pub fn chargeback_count(&self) -> u64 {
        self.chargeback_processing_count + self.chargeback_approved_count
    }

    pub fn has_sales(&self) -> bool {
        !self.total_sales_amount.is_zero() || !self.total_sales_eur.is_zero()
    }

    /// Exchange rate required to settle this block.
    ///
    /// EUR blocks are 1:1 by definition. Any other currency without a
    /// positive rate is a data error for the whole block; it is never
    /// defaulted.
    pub fn required_exchange_rate(&self) -> Result<Decimal> {
        match self.exchange_rate {
            Some(rate) if rate > Decimal::ZERO => Ok(rate),
            Some(rate) => Err(SettlementError::invalid_input(
                "exchange_rate",
                format!("rate {} for {} must be positive", rate, self.currency),
            )),
            None if self.currency.is_eur() => Ok(Decimal::ONE),
            None => Err(SettlementError::MissingExchangeRate {
                currency: self.currency.to_string(),
            }),
        }
    }
}
