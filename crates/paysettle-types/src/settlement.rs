//! Settlement block result

use serde::{Deserialize, Serialize};

use crate::{Currency, MoneyPair, Owner, SettlementPeriod};

/// Computed totals for one owner, one currency, one period.
///
/// Derived data only; recomputable at any time from the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBlock {
    pub owner: Owner,
    pub currency: Currency,
    pub period: SettlementPeriod,
    pub total_processing: MoneyPair,
    pub total_fees: MoneyPair,
    pub total_chargebacks: MoneyPair,
    pub total_refunds: MoneyPair,
    pub generated_reserve: MoneyPair,
    pub released_reserve: MoneyPair,
    pub gross_amount: MoneyPair,
    pub statement_total: MoneyPair,
    pub total_amount: MoneyPair,
    pub total_amount_paid: MoneyPair,
}
