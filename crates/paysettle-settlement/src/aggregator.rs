//! Settlement summary aggregation
//!
//! Pure computation of one currency block from already-gathered inputs.
//! Every figure is computed twice, once from the original-currency fields
//! and once from the EUR fields, with the same formula shape.

use chrono::NaiveDate;

use paysettle_types::{
    AppliedFee, Currency, MoneyPair, Owner, Result, RollingReserveEntry, SettlementBlock, SettlementError,
    SettlementPeriod, TransactionAggregate,
};

/// Everything aggregated into one block
#[derive(Debug, Clone, Copy)]
pub struct BlockInputs<'a> {
    pub owner: Owner,
    pub period: SettlementPeriod,
    /// Reserves due on or before this date may be paid out
    pub settlement_date: NaiveDate,
    pub aggregate: &'a TransactionAggregate,
    pub applied_fees: &'a [AppliedFee],
    /// Reserve withheld from this period, if any
    pub new_reserve_entry: Option<&'a RollingReserveEntry>,
    /// Due pending entries of the owner plus those this block already paid
    /// out; other currencies are ignored
    pub releasable_reserves: &'a [RollingReserveEntry],
}

/// Foreign exchange fee deducted from the paid amount. Currently never charged.
pub fn foreign_exchange_fee(_currency: Currency) -> MoneyPair {
    MoneyPair::zero()
}

fn checked_add(a: MoneyPair, b: MoneyPair) -> Result<MoneyPair> {
    Ok(MoneyPair::new(
        a.original.checked_add(b.original).ok_or(SettlementError::AmountOverflow)?,
        a.eur.checked_add(b.eur).ok_or(SettlementError::AmountOverflow)?,
    ))
}

fn checked_sub(a: MoneyPair, b: MoneyPair) -> Result<MoneyPair> {
    Ok(MoneyPair::new(
        a.original.checked_sub(b.original).ok_or(SettlementError::AmountOverflow)?,
        a.eur.checked_sub(b.eur).ok_or(SettlementError::AmountOverflow)?,
    ))
}

fn checked_total(pairs: impl IntoIterator<Item = MoneyPair>) -> Result<MoneyPair> {
    pairs.into_iter().try_fold(MoneyPair::zero(), checked_add)
}

fn mismatch(expected: Currency, actual: Currency) -> SettlementError {
    SettlementError::CurrencyMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn validate(inputs: &BlockInputs<'_>) -> Result<()> {
    let currency = inputs.aggregate.currency;

    inputs.aggregate.required_exchange_rate()?;

    if let Some(fee) = inputs.applied_fees.iter().find(|f| f.currency != currency) {
        return Err(mismatch(currency, fee.currency));
    }

    if let Some(entry) = inputs.new_reserve_entry {
        if entry.original_currency != currency {
            return Err(mismatch(currency, entry.original_currency));
        }
        if entry.owner != inputs.owner {
            return Err(SettlementError::invalid_input(
                "new_reserve_entry",
                format!("belongs to {}, block is for {}", entry.owner, inputs.owner),
            ));
        }
    }

    for entry in inputs.releasable_reserves {
        if entry.owner != inputs.owner {
            return Err(SettlementError::invalid_input(
                "releasable_reserves",
                format!("entry {} belongs to {}, block is for {}", entry.id, entry.owner, inputs.owner),
            ));
        }
        if !entry.is_releasable(inputs.settlement_date) && !entry.is_released_for(&inputs.period) {
            return Err(SettlementError::invalid_input(
                "releasable_reserves",
                format!(
                    "entry {} is {} and due {}, not payable on {}",
                    entry.id, entry.status, entry.release_due_date, inputs.settlement_date
                ),
            ));
        }
    }

    Ok(())
}

/// Compute the settlement block for one owner, currency and period
pub fn aggregate_block(inputs: &BlockInputs<'_>) -> Result<SettlementBlock> {
    validate(inputs)?;
    let agg = inputs.aggregate;
    let currency = agg.currency;

    let total_processing = MoneyPair::new(agg.total_sales_amount, agg.total_sales_eur);
    let total_fees = checked_total(inputs.applied_fees.iter().map(|f| MoneyPair::new(f.amount, f.amount_eur)))?;
    let total_chargebacks = checked_add(
        MoneyPair::new(agg.chargeback_processing_amount, agg.chargeback_processing_eur),
        MoneyPair::new(agg.chargeback_approved_amount, agg.chargeback_approved_eur),
    )?;
    let total_refunds = MoneyPair::new(agg.total_refunds_amount, agg.total_refunds_eur);
    let generated_reserve = inputs
        .new_reserve_entry
        .map(RollingReserveEntry::amounts)
        .unwrap_or_default();
    let released_reserve = checked_total(
        inputs
            .releasable_reserves
            .iter()
            .filter(|e| e.original_currency == currency)
            .map(RollingReserveEntry::amounts),
    )?;

    let mut gross_amount = checked_add(total_processing, released_reserve)?;
    for deduction in [total_refunds, total_fees, total_chargebacks, generated_reserve] {
        gross_amount = checked_sub(gross_amount, deduction)?;
    }

    let statement_total = gross_amount;
    let total_amount = statement_total;
    let total_amount_paid = checked_sub(total_amount, foreign_exchange_fee(currency))?;

    Ok(SettlementBlock {
        owner: inputs.owner,
        currency,
        period: inputs.period,
        total_processing,
        total_fees,
        total_chargebacks,
        total_refunds,
        generated_reserve,
        released_reserve,
        gross_amount,
        statement_total,
        total_amount,
        total_amount_paid,
    })
}
