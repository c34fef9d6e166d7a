//! Rolling reserve types
//!
//! A reserve entry withholds a share of one period's sales until its
//! release-due date. Entries are append-only; the only transition is
//! `pending -> released`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Currency, MoneyPair, Owner, SettlementPeriod};

/// Default share of sales withheld, in percent
pub const DEFAULT_RESERVE_PERCENTAGE: Decimal = Decimal::TEN;

/// Default holding period before an entry can be released
pub const DEFAULT_HOLDING_PERIOD_MONTHS: u32 = 6;

/// Identifier of a reserve ledger row
pub type ReserveEntryId = i64;

/// Reserve terms for one owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSettings {
    /// Percent of sales withheld (10 = 10%)
    pub percentage: Decimal,
    pub holding_period_months: u32,
}

impl Default for ReserveSettings {
    fn default() -> Self {
        Self {
            percentage: DEFAULT_RESERVE_PERCENTAGE,
            holding_period_months: DEFAULT_HOLDING_PERIOD_MONTHS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReserveStatus {
    Pending,
    Released,
}

impl ReserveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Released => "released",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "released" => Some(Self::Released),
            _ => None,
        }
    }
}

impl fmt::Display for ReserveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the rolling reserve ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingReserveEntry {
    pub id: ReserveEntryId,
    pub owner: Owner,
    /// Minor units of `original_currency`
    pub original_amount: i64,
    pub original_currency: Currency,
    /// Minor units of EUR
    pub reserve_amount_eur: i64,
    pub exchange_rate: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub release_due_date: NaiveDate,
    pub status: ReserveStatus,
    pub released_at: Option<DateTime<Utc>>,
    /// Settlement period whose block paid the entry out
    pub released_for: Option<SettlementPeriod>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RollingReserveEntry {
    pub fn period(&self) -> SettlementPeriod {
        SettlementPeriod {
            start: self.period_start,
            end: self.period_end,
        }
    }

    /// Original and EUR amounts in currency units
    pub fn amounts(&self) -> MoneyPair {
        MoneyPair::from_minor(self.original_amount, self.reserve_amount_eur)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Pending, live and due on or before `as_of`
    pub fn is_releasable(&self, as_of: NaiveDate) -> bool {
        self.status == ReserveStatus::Pending
            && self.released_at.is_none()
            && !self.is_deleted()
            && self.release_due_date <= as_of
    }

    /// Already paid out by the block of `period`
    pub fn is_released_for(&self, period: &SettlementPeriod) -> bool {
        self.status == ReserveStatus::Released && !self.is_deleted() && self.released_for.as_ref() == Some(period)
    }

    /// Same owner, currency and period as another entry
    pub fn matches_slot(&self, owner: &Owner, currency: Currency, period: &SettlementPeriod) -> bool {
        self.owner == *owner
            && self.original_currency == currency
            && self.period_start == period.start
            && self.period_end == period.end
    }

    /// Transition `pending -> released` on behalf of the block of `period`.
    /// Returns false if already released.
    pub fn release(&mut self, period: SettlementPeriod, at: DateTime<Utc>) -> bool {
        if self.status == ReserveStatus::Released {
            return false;
        }
        self.status = ReserveStatus::Released;
        self.released_at = Some(at);
        self.released_for = Some(period);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MerchantId;
    use rust_decimal_macros::dec;

    fn entry() -> RollingReserveEntry {
        RollingReserveEntry {
            id: 1,
            owner: Owner::merchant(MerchantId::new()),
            original_amount: 10_000,
            original_currency: Currency::EUR,
            reserve_amount_eur: 10_000,
            exchange_rate: Decimal::ONE,
            period_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            release_due_date: NaiveDate::from_ymd_opt(2025, 7, 31).unwrap(),
            status: ReserveStatus::Pending,
            released_at: None,
            released_for: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = ReserveSettings::default();
        assert_eq!(settings.percentage, dec!(10));
        assert_eq!(settings.holding_period_months, 6);
    }

    fn august() -> SettlementPeriod {
        SettlementPeriod::new(
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_release_sets_timestamp_once() {
        let mut e = entry();
        assert!(e.release(august(), Utc::now()));
        assert_eq!(e.status, ReserveStatus::Released);
        assert!(e.released_at.is_some());
        assert!(!e.release(august(), Utc::now()));
    }

    #[test]
    fn test_released_for_block_period() {
        let mut e = entry();
        assert!(!e.is_released_for(&august()));
        e.release(august(), Utc::now());

        assert!(e.is_released_for(&august()));
        assert!(!e.is_released_for(&e.period()));
        assert!(!e.is_releasable(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()));
    }

    #[test]
    fn test_releasable_boundary() {
        let e = entry();
        assert!(!e.is_releasable(NaiveDate::from_ymd_opt(2025, 7, 30).unwrap()));
        assert!(e.is_releasable(NaiveDate::from_ymd_opt(2025, 7, 31).unwrap()));
    }

    #[test]
    fn test_amounts_in_units() {
        assert_eq!(entry().amounts(), MoneyPair::new(dec!(100), dec!(100)));
    }
}
