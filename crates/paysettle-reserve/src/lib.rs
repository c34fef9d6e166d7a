//! PaySettle Reserve - Rolling reserve ledger for merchant settlement
//!
//! The ledger is:
//! - Owner-scoped (merchant or shop) and currency-scoped
//! - Append-only (entries are never deleted, only soft-deleted for audit)
//! - Idempotent (one entry per owner, currency and period)
//! - Atomic on release (a release batch transitions fully or not at all)
//!
//! # Invariants
//!
//! 1. `release_due_date = period_end + holding_period_months`
//! 2. `released_at` is set exactly when the status is `released`
//! 3. An entry is released at most once

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use paysettle_types::{
    add_months, units_to_minor, Currency, Owner, ReserveEntryId, ReserveSettings, RollingReserveEntry,
    SettlementError, SettlementPeriod,
};

pub use store::{InMemoryReserveStore, NewReserveEntry, ReserveStore};

/// Errors that can occur in reserve ledger operations
#[derive(Error, Debug, Clone)]
pub enum ReserveError {
    #[error("Reserve entry not found: {id}")]
    EntryNotFound { id: ReserveEntryId },

    #[error("Reserve entry already exists for {owner} {currency} {period}")]
    DuplicateEntry {
        owner: String,
        currency: String,
        period: String,
    },

    #[error("Release conflict: entries {ids:?} are not pending")]
    ReleaseConflict { ids: Vec<ReserveEntryId> },

    #[error("Invalid reserve settings: {message}")]
    InvalidSettings { message: String },

    #[error("Amount error: {message}")]
    Amount { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, ReserveError>;

impl From<ReserveError> for SettlementError {
    fn from(e: ReserveError) -> Self {
        match e {
            ReserveError::ReleaseConflict { .. } | ReserveError::DuplicateEntry { .. } => {
                SettlementError::conflict(e.to_string())
            }
            ReserveError::InvalidSettings { message } => SettlementError::invalid_input("reserve_settings", message),
            ReserveError::Amount { .. } => SettlementError::AmountOverflow,
            ReserveError::EntryNotFound { .. } | ReserveError::Storage { .. } => {
                SettlementError::persistence(e.to_string())
            }
        }
    }
}

/// Input for creating the reserve entry of one period
#[derive(Debug, Clone, PartialEq)]
pub struct CreateReserveRequest {
    pub owner: Owner,
    pub currency: Currency,
    /// Sales total in currency units of `currency`
    pub sales_amount: Decimal,
    /// Sales total in EUR
    pub sales_amount_eur: Decimal,
    pub exchange_rate: Decimal,
    pub period: SettlementPeriod,
    pub settings: ReserveSettings,
}

/// What `create_reserve_entry` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveCreation {
    /// A new pending entry was written
    Created(RollingReserveEntry),
    /// The slot already had an entry; nothing was written
    Existing(RollingReserveEntry),
    /// No sales activity, nothing to withhold
    Skipped,
}

impl ReserveCreation {
    /// The entry backing this period, new or pre-existing
    pub fn entry(&self) -> Option<&RollingReserveEntry> {
        match self {
            Self::Created(e) | Self::Existing(e) => Some(e),
            Self::Skipped => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Reserve amounts in minor units, original currency and EUR.
///
/// Each side is computed from its own sales total so EUR never inherits
/// rounding from the original-currency figure.
pub fn compute_reserve_amounts(
    sales_amount: Decimal,
    sales_amount_eur: Decimal,
    settings: &ReserveSettings,
) -> Result<(i64, i64)> {
    validate_settings(settings)?;
    let share = settings.percentage / Decimal::ONE_HUNDRED;

    let to_minor = |units: Decimal| {
        units
            .checked_mul(share)
            .ok_or(SettlementError::AmountOverflow)
            .and_then(units_to_minor)
            .map_err(|e| ReserveError::Amount { message: e.to_string() })
    };

    Ok((to_minor(sales_amount)?, to_minor(sales_amount_eur)?))
}

/// Date a period's reserve becomes releasable
pub fn release_due_date(period_end: NaiveDate, holding_period_months: u32) -> Result<NaiveDate> {
    add_months(period_end, holding_period_months).map_err(|e| ReserveError::InvalidSettings { message: e.to_string() })
}

fn validate_settings(settings: &ReserveSettings) -> Result<()> {
    if settings.percentage < Decimal::ZERO || settings.percentage > Decimal::ONE_HUNDRED {
        return Err(ReserveError::InvalidSettings {
            message: format!("percentage {} outside 0..=100", settings.percentage),
        });
    }
    Ok(())
}

/// The rolling reserve ledger over a persistence port
#[derive(Clone)]
pub struct RollingReserveLedger {
    store: Arc<dyn ReserveStore>,
}

impl RollingReserveLedger {
    pub fn new(store: Arc<dyn ReserveStore>) -> Self {
        Self { store }
    }

    /// Owner-specific terms. Callers apply their own default when `None`.
    pub async fn get_merchant_reserve_settings(&self, owner: &Owner) -> Result<Option<ReserveSettings>> {
        self.store.get_merchant_reserve_settings(owner).await
    }

    /// Withhold a share of the period's sales.
    ///
    /// Re-running for a period that already has an entry returns that entry
    /// and writes nothing.
    pub async fn create_reserve_entry(
        &self,
        request: CreateReserveRequest,
        now: DateTime<Utc>,
    ) -> Result<ReserveCreation> {
        if let Some(existing) = self
            .store
            .find_entry(&request.owner, request.currency, &request.period)
            .await?
        {
            debug!(
                owner = %request.owner,
                currency = %request.currency,
                period = %request.period,
                entry_id = existing.id,
                "Reserve entry already exists"
            );
            return Ok(ReserveCreation::Existing(existing));
        }

        if request.sales_amount <= Decimal::ZERO && request.sales_amount_eur <= Decimal::ZERO {
            debug!(owner = %request.owner, period = %request.period, "No sales, no reserve");
            return Ok(ReserveCreation::Skipped);
        }

        let (original_amount, reserve_amount_eur) =
            compute_reserve_amounts(request.sales_amount, request.sales_amount_eur, &request.settings)?;
        if original_amount == 0 && reserve_amount_eur == 0 {
            return Ok(ReserveCreation::Skipped);
        }

        let new_entry = NewReserveEntry {
            owner: request.owner,
            original_amount,
            original_currency: request.currency,
            reserve_amount_eur,
            exchange_rate: request.exchange_rate,
            period: request.period,
            release_due_date: release_due_date(request.period.end, request.settings.holding_period_months)?,
            created_at: now,
        };

        match self.store.insert_entry(new_entry).await {
            Ok(entry) => {
                info!(
                    owner = %entry.owner,
                    currency = %entry.original_currency,
                    entry_id = entry.id,
                    amount = entry.original_amount,
                    release_due = %entry.release_due_date,
                    "Reserve entry created"
                );
                Ok(ReserveCreation::Created(entry))
            }
            Err(ReserveError::DuplicateEntry { .. }) => {
                // Lost a race with a concurrent run for the same slot
                let existing = self
                    .store
                    .find_entry(&request.owner, request.currency, &request.period)
                    .await?
                    .ok_or_else(|| ReserveError::Storage {
                        message: "duplicate reported but no entry found".to_string(),
                    })?;
                Ok(ReserveCreation::Existing(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Pending entries due on or before `as_of`
    pub async fn get_releaseable_funds(
        &self,
        owner: &Owner,
        currency: Option<Currency>,
        as_of: NaiveDate,
    ) -> Result<Vec<RollingReserveEntry>> {
        self.store.list_releasable(owner, currency, as_of).await
    }

    /// Entries the block of `period` already paid out.
    ///
    /// Re-running a committed block counts these again so its figures do
    /// not change.
    pub async fn get_released_for_period(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Vec<RollingReserveEntry>> {
        self.store.list_released_for(owner, currency, period).await
    }

    /// Release a set of entries atomically, tagged with the paying block's period
    pub async fn mark_reserve_as_released(
        &self,
        ids: &[ReserveEntryId],
        period: &SettlementPeriod,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        match self.store.mark_released(ids, period, now).await {
            Ok(count) => {
                info!(count, period = %period, "Reserve entries released");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, ?ids, "Reserve release rejected");
                Err(e)
            }
        }
    }

    /// Hide an entry from the ledger while keeping the row for audit
    pub async fn soft_delete(&self, id: ReserveEntryId, now: DateTime<Utc>) -> Result<()> {
        self.store.soft_delete(id, now).await?;
        info!(entry_id = id, "Reserve entry soft-deleted");
        Ok(())
    }

    pub async fn entries(&self, owner: &Owner) -> Result<Vec<RollingReserveEntry>> {
        self.store.list_entries(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysettle_types::{MerchantId, ReserveStatus};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january() -> SettlementPeriod {
        SettlementPeriod::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap()
    }

    fn august() -> SettlementPeriod {
        SettlementPeriod::new(date(2025, 8, 1), date(2025, 8, 31)).unwrap()
    }

    fn request(owner: Owner, currency: Currency, sales: Decimal, sales_eur: Decimal) -> CreateReserveRequest {
        CreateReserveRequest {
            owner,
            currency,
            sales_amount: sales,
            sales_amount_eur: sales_eur,
            exchange_rate: if currency.is_eur() { Decimal::ONE } else { dec!(1.08) },
            period: january(),
            settings: ReserveSettings::default(),
        }
    }

    fn ledger() -> (RollingReserveLedger, InMemoryReserveStore) {
        let store = InMemoryReserveStore::new();
        (RollingReserveLedger::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_create_entry_with_defaults() {
        let (ledger, _) = ledger();
        let owner = Owner::merchant(MerchantId::new());

        let created = ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(1000), dec!(1000)), Utc::now())
            .await
            .unwrap();

        let entry = created.entry().unwrap();
        assert!(created.is_created());
        assert_eq!(entry.original_amount, 10_000); // 10% of 1000.00 in cents
        assert_eq!(entry.reserve_amount_eur, 10_000);
        assert_eq!(entry.release_due_date, date(2025, 7, 31));
        assert_eq!(entry.status, ReserveStatus::Pending);
        assert!(entry.released_at.is_none());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (ledger, store) = ledger();
        let owner = Owner::merchant(MerchantId::new());

        let first = ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(500), dec!(500)), Utc::now())
            .await
            .unwrap();
        let second = ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(500), dec!(500)), Utc::now())
            .await
            .unwrap();

        assert!(first.is_created());
        assert!(matches!(second, ReserveCreation::Existing(_)));
        assert_eq!(first.entry(), second.entry());
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_zero_sales_skipped() {
        let (ledger, store) = ledger();
        let owner = Owner::merchant(MerchantId::new());

        let result = ledger
            .create_reserve_entry(request(owner, Currency::EUR, Decimal::ZERO, Decimal::ZERO), Utc::now())
            .await
            .unwrap();

        assert_eq!(result, ReserveCreation::Skipped);
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_eur_twin_computed_independently() {
        let (ledger, _) = ledger();
        let owner = Owner::merchant(MerchantId::new());

        let created = ledger
            .create_reserve_entry(request(owner, Currency::USD, dec!(1234.56), dec!(1143.11)), Utc::now())
            .await
            .unwrap();

        let entry = created.entry().unwrap();
        assert_eq!(entry.original_amount, 12_346); // 123.456 rounds up
        assert_eq!(entry.reserve_amount_eur, 11_431); // 114.311 rounds down
    }

    #[tokio::test]
    async fn test_owner_settings_override() {
        let (ledger, store) = ledger();
        let owner = Owner::merchant(MerchantId::new());
        let custom = ReserveSettings {
            percentage: dec!(5),
            holding_period_months: 3,
        };
        store.set_settings(owner, custom).await;

        let settings = ledger.get_merchant_reserve_settings(&owner).await.unwrap().unwrap_or_default();
        let mut req = request(owner, Currency::EUR, dec!(1000), dec!(1000));
        req.settings = settings;

        let created = ledger.create_reserve_entry(req, Utc::now()).await.unwrap();
        let entry = created.entry().unwrap();
        assert_eq!(entry.original_amount, 5_000);
        assert_eq!(entry.release_due_date, date(2025, 4, 30));
    }

    #[tokio::test]
    async fn test_release_lifecycle() {
        let (ledger, _) = ledger();
        let owner = Owner::merchant(MerchantId::new());

        let created = ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(1000), dec!(1000)), Utc::now())
            .await
            .unwrap();
        let id = created.entry().unwrap().id;

        assert!(ledger
            .get_releaseable_funds(&owner, Some(Currency::EUR), date(2025, 7, 30))
            .await
            .unwrap()
            .is_empty());

        let due = ledger
            .get_releaseable_funds(&owner, Some(Currency::EUR), date(2025, 7, 31))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);

        assert_eq!(ledger.mark_reserve_as_released(&[id], &august(), Utc::now()).await.unwrap(), 1);

        let entries = ledger.entries(&owner).await.unwrap();
        assert_eq!(entries[0].status, ReserveStatus::Released);
        assert!(entries[0].released_at.is_some());
        assert_eq!(entries[0].released_for, Some(august()));

        let paid = ledger
            .get_released_for_period(&owner, Currency::EUR, &august())
            .await
            .unwrap();
        assert_eq!(paid.len(), 1);
        assert!(ledger
            .get_released_for_period(&owner, Currency::EUR, &january())
            .await
            .unwrap()
            .is_empty());
        assert!(ledger
            .get_released_for_period(&owner, Currency::USD, &august())
            .await
            .unwrap()
            .is_empty());
        assert!(ledger
            .get_releaseable_funds(&owner, None, date(2026, 1, 1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_double_release_rejected() {
        let (ledger, _) = ledger();
        let owner = Owner::merchant(MerchantId::new());
        let id = ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(1000), dec!(1000)), Utc::now())
            .await
            .unwrap()
            .entry()
            .unwrap()
            .id;

        ledger.mark_reserve_as_released(&[id], &august(), Utc::now()).await.unwrap();
        let second = ledger.mark_reserve_as_released(&[id], &august(), Utc::now()).await;

        assert!(matches!(second, Err(ReserveError::ReleaseConflict { .. })));
    }

    #[tokio::test]
    async fn test_release_is_all_or_nothing() {
        let (ledger, store) = ledger();
        let owner = Owner::merchant(MerchantId::new());
        let id = ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(1000), dec!(1000)), Utc::now())
            .await
            .unwrap()
            .entry()
            .unwrap()
            .id;

        let result = ledger.mark_reserve_as_released(&[id, 999], &august(), Utc::now()).await;

        match result {
            Err(ReserveError::ReleaseConflict { ids }) => assert_eq!(ids, vec![999]),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.get(id).await.unwrap().status, ReserveStatus::Pending);
    }

    #[tokio::test]
    async fn test_releasable_scoped_by_currency() {
        let (ledger, _) = ledger();
        let owner = Owner::merchant(MerchantId::new());

        ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(1000), dec!(1000)), Utc::now())
            .await
            .unwrap();
        ledger
            .create_reserve_entry(request(owner, Currency::USD, dec!(1080), dec!(1000)), Utc::now())
            .await
            .unwrap();

        let as_of = date(2025, 8, 1);
        let eur = ledger.get_releaseable_funds(&owner, Some(Currency::EUR), as_of).await.unwrap();
        let all = ledger.get_releaseable_funds(&owner, None, as_of).await.unwrap();

        assert_eq!(eur.len(), 1);
        assert_eq!(eur[0].original_currency, Currency::EUR);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_soft_deleted_entry_is_hidden() {
        let (ledger, store) = ledger();
        let owner = Owner::merchant(MerchantId::new());
        let id = ledger
            .create_reserve_entry(request(owner, Currency::EUR, dec!(1000), dec!(1000)), Utc::now())
            .await
            .unwrap()
            .entry()
            .unwrap()
            .id;

        ledger.soft_delete(id, Utc::now()).await.unwrap();

        assert!(ledger.entries(&owner).await.unwrap().is_empty());
        assert!(store.get(id).await.unwrap().deleted_at.is_some());
        assert!(matches!(
            ledger.mark_reserve_as_released(&[id], &august(), Utc::now()).await,
            Err(ReserveError::ReleaseConflict { .. })
        ));
    }

    #[test]
    fn test_invalid_percentage() {
        let settings = ReserveSettings {
            percentage: dec!(120),
            holding_period_months: 6,
        };
        assert!(matches!(
            compute_reserve_amounts(dec!(100), dec!(100), &settings),
            Err(ReserveError::InvalidSettings { .. })
        ));
    }
}
