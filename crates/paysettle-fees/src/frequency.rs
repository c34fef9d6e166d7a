//! Frequency gating
//!
//! Decides whether a fee's frequency window is still open for an owner,
//! based on when the same fee was applied before.

use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;

use paysettle_types::{AppliedFee, FeeFrequency, Owner, SettlementPeriod};

use crate::FeeResult;

/// Fee application history port
pub trait FrequencyGate: Send + Sync {
    fn should_apply_fee(
        &self,
        frequency: FeeFrequency,
        owner: &Owner,
        fee_key: &str,
        period: &SettlementPeriod,
    ) -> FeeResult<bool>;
}

/// Gate that never suppresses a fee
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysApply;

impl FrequencyGate for AlwaysApply {
    fn should_apply_fee(&self, _: FeeFrequency, _: &Owner, _: &str, _: &SettlementPeriod) -> FeeResult<bool> {
        Ok(true)
    }
}

/// Gate over pre-fetched application history.
///
/// Applications recorded for the very period being settled are ignored so
/// re-running a settlement reproduces the same fees.
#[derive(Default)]
pub struct HistoryFrequencyGate {
    history: RwLock<Vec<AppliedFee>>,
}

impl HistoryFrequencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: Vec<AppliedFee>) -> Self {
        Self {
            history: RwLock::new(history),
        }
    }

    /// Append applied fees to the history
    pub fn record(&self, applied: impl IntoIterator<Item = AppliedFee>) {
        self.history.write().extend(applied);
    }

    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }
}

impl FrequencyGate for HistoryFrequencyGate {
    fn should_apply_fee(
        &self,
        frequency: FeeFrequency,
        owner: &Owner,
        fee_key: &str,
        period: &SettlementPeriod,
    ) -> FeeResult<bool> {
        if frequency == FeeFrequency::Transaction {
            return Ok(true);
        }

        let history = self.history.read();
        let mut prior = history
            .iter()
            .filter(|fee| fee.owner == *owner && fee.fee_key == fee_key && fee.period != *period);

        let already_applied = match frequency {
            FeeFrequency::Transaction => false,
            FeeFrequency::OneTime => prior.next().is_some(),
            window => prior.any(|fee| same_window(window, fee.period.end, period.end)),
        };
        Ok(!already_applied)
    }
}

fn same_window(frequency: FeeFrequency, a: NaiveDate, b: NaiveDate) -> bool {
    match frequency {
        FeeFrequency::Daily => a == b,
        FeeFrequency::Weekly => a.iso_week() == b.iso_week(),
        FeeFrequency::Monthly => a.year() == b.year() && a.month() == b.month(),
        FeeFrequency::Yearly => a.year() == b.year(),
        FeeFrequency::Transaction | FeeFrequency::OneTime => false,
    }
}
