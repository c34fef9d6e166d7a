//! Reserve persistence port and an in-memory implementation

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use paysettle_types::{
    Currency, Owner, ReserveEntryId, ReserveSettings, ReserveStatus, RollingReserveEntry, SettlementPeriod,
};

use crate::{ReserveError, Result};

/// A reserve row before the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReserveEntry {
    pub owner: Owner,
    pub original_amount: i64,
    pub original_currency: Currency,
    pub reserve_amount_eur: i64,
    pub exchange_rate: Decimal,
    pub period: SettlementPeriod,
    pub release_due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Durable storage for the rolling reserve ledger
#[async_trait]
pub trait ReserveStore: Send + Sync {
    /// Owner-specific reserve terms, if any were configured
    async fn get_merchant_reserve_settings(&self, owner: &Owner) -> Result<Option<ReserveSettings>>;

    /// Live entry for the exact (owner, currency, period) slot
    async fn find_entry(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Option<RollingReserveEntry>>;

    /// Insert a pending entry. Fails with `DuplicateEntry` if the slot is taken.
    async fn insert_entry(&self, entry: NewReserveEntry) -> Result<RollingReserveEntry>;

    /// Pending, live entries due on or before `as_of`
    async fn list_releasable(
        &self,
        owner: &Owner,
        currency: Option<Currency>,
        as_of: NaiveDate,
    ) -> Result<Vec<RollingReserveEntry>>;

    /// Entries already paid out by the block of `period`
    async fn list_released_for(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Vec<RollingReserveEntry>>;

    /// Release every id or none of them, on behalf of the block of `period`
    async fn mark_released(
        &self,
        ids: &[ReserveEntryId],
        period: &SettlementPeriod,
        at: DateTime<Utc>,
    ) -> Result<usize>;

    async fn soft_delete(&self, id: ReserveEntryId, at: DateTime<Utc>) -> Result<()>;

    /// Every live entry of an owner, oldest first
    async fn list_entries(&self, owner: &Owner) -> Result<Vec<RollingReserveEntry>>;
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<ReserveEntryId, RollingReserveEntry>,
    next_id: ReserveEntryId,
}

/// In-memory reserve store. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct InMemoryReserveStore {
    state: Arc<RwLock<MemoryState>>,
    settings: Arc<RwLock<HashMap<Owner, ReserveSettings>>>,
}

impl InMemoryReserveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_settings(&self, owner: Owner, settings: ReserveSettings) {
        self.settings.write().await.insert(owner, settings);
    }

    /// Entry by id, including soft-deleted ones
    pub async fn get(&self, id: ReserveEntryId) -> Option<RollingReserveEntry> {
        self.state.read().await.entries.get(&id).cloned()
    }

    /// Number of rows ever written, including soft-deleted ones
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[async_trait]
impl ReserveStore for InMemoryReserveStore {
    async fn get_merchant_reserve_settings(&self, owner: &Owner) -> Result<Option<ReserveSettings>> {
        Ok(self.settings.read().await.get(owner).copied())
    }

    async fn find_entry(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Option<RollingReserveEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .find(|e| !e.is_deleted() && e.matches_slot(owner, currency, period))
            .cloned())
    }

    async fn insert_entry(&self, entry: NewReserveEntry) -> Result<RollingReserveEntry> {
        let mut state = self.state.write().await;

        let taken = state
            .entries
            .values()
            .any(|e| !e.is_deleted() && e.matches_slot(&entry.owner, entry.original_currency, &entry.period));
        if taken {
            return Err(ReserveError::DuplicateEntry {
                owner: entry.owner.to_string(),
                currency: entry.original_currency.to_string(),
                period: entry.period.to_string(),
            });
        }

        state.next_id += 1;
        let row = RollingReserveEntry {
            id: state.next_id,
            owner: entry.owner,
            original_amount: entry.original_amount,
            original_currency: entry.original_currency,
            reserve_amount_eur: entry.reserve_amount_eur,
            exchange_rate: entry.exchange_rate,
            period_start: entry.period.start,
            period_end: entry.period.end,
            release_due_date: entry.release_due_date,
            status: ReserveStatus::Pending,
            released_at: None,
            released_for: None,
            created_at: entry.created_at,
            deleted_at: None,
        };
        state.entries.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_releasable(
        &self,
        owner: &Owner,
        currency: Option<Currency>,
        as_of: NaiveDate,
    ) -> Result<Vec<RollingReserveEntry>> {
        let state = self.state.read().await;
        let mut due: Vec<RollingReserveEntry> = state
            .entries
            .values()
            .filter(|e| e.owner == *owner)
            .filter(|e| currency.map_or(true, |c| e.original_currency == c))
            .filter(|e| e.is_releasable(as_of))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.id);
        Ok(due)
    }

    async fn list_released_for(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Vec<RollingReserveEntry>> {
        let state = self.state.read().await;
        let mut released: Vec<RollingReserveEntry> = state
            .entries
            .values()
            .filter(|e| e.owner == *owner && e.original_currency == currency)
            .filter(|e| e.is_released_for(period))
            .cloned()
            .collect();
        released.sort_by_key(|e| e.id);
        Ok(released)
    }

    async fn mark_released(
        &self,
        ids: &[ReserveEntryId],
        period: &SettlementPeriod,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let ids: BTreeSet<ReserveEntryId> = ids.iter().copied().collect();
        let mut state = self.state.write().await;

        let blocked: Vec<ReserveEntryId> = ids
            .iter()
            .copied()
            .filter(|id| match state.entries.get(id) {
                Some(e) => e.status != ReserveStatus::Pending || e.is_deleted(),
                None => true,
            })
            .collect();
        if !blocked.is_empty() {
            return Err(ReserveError::ReleaseConflict { ids: blocked });
        }

        for id in &ids {
            if let Some(entry) = state.entries.get_mut(id) {
                entry.release(*period, at);
            }
        }
        Ok(ids.len())
    }

    async fn soft_delete(&self, id: ReserveEntryId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(&id)
            .filter(|e| !e.is_deleted())
            .ok_or(ReserveError::EntryNotFound { id })?;
        entry.deleted_at = Some(at);
        Ok(())
    }

    async fn list_entries(&self, owner: &Owner) -> Result<Vec<RollingReserveEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<RollingReserveEntry> = state
            .entries
            .values()
            .filter(|e| e.owner == *owner && !e.is_deleted())
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }
}
