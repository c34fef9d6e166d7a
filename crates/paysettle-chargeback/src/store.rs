//! Chargeback persistence port and an in-memory implementation

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use paysettle_types::{ChargebackRecord, ChargebackStatus, Owner};

use crate::{ChargebackError, Result};

/// Terminal chargebacks handed to one settlement, split by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementPartition {
    pub approved: Vec<String>,
    pub declined: Vec<String>,
}

impl SettlementPartition {
    pub fn is_empty(&self) -> bool {
        self.approved.is_empty() && self.declined.is_empty()
    }

    pub fn len(&self) -> usize {
        self.approved.len() + self.declined.len()
    }

    /// Every id with the status it is expected to have
    pub fn expected_statuses(&self) -> impl Iterator<Item = (&str, ChargebackStatus)> {
        self.approved
            .iter()
            .map(|id| (id.as_str(), ChargebackStatus::Approved))
            .chain(self.declined.iter().map(|id| (id.as_str(), ChargebackStatus::Declined)))
    }
}

/// Durable storage for tracked chargebacks, keyed by transaction id
#[async_trait]
pub trait ChargebackStore: Send + Sync {
    async fn find_existing_chargeback(&self, transaction_id: &str) -> Result<Option<ChargebackRecord>>;

    /// Insert a new record. Fails with `DuplicateTransaction` if the id is tracked.
    async fn track_new_chargeback(&self, record: ChargebackRecord) -> Result<ChargebackRecord>;

    /// Move a non-terminal record to `status`. A terminal record is never changed.
    async fn update_chargeback_status(
        &self,
        transaction_id: &str,
        status: ChargebackStatus,
        at: DateTime<Utc>,
    ) -> Result<ChargebackRecord>;

    /// Claim the terminal notification. Returns `false` if it was already claimed.
    async fn mark_notified(&self, transaction_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Drop a claim whose delivery failed so it can be claimed again
    async fn release_notification(&self, transaction_id: &str) -> Result<()>;

    /// Terminal records with no notification claim, across owners
    async fn list_unnotified(&self) -> Result<Vec<ChargebackRecord>>;

    /// Unsettled records of an owner, oldest first
    async fn get_pending_settlements(&self, owner: &Owner) -> Result<Vec<ChargebackRecord>>;

    /// Settle every id of the partition or none of them
    async fn mark_as_settled(&self, partition: &SettlementPartition, settled_date: NaiveDate) -> Result<usize>;

    /// Records whose processing date falls within `from..=to`
    async fn get_chargebacks_by_date_range(
        &self,
        owner: &Owner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ChargebackRecord>>;

    /// Every record still `PROCESSING`, across owners
    async fn list_processing(&self) -> Result<Vec<ChargebackRecord>>;
}

fn oldest_first(records: &mut [ChargebackRecord]) {
    records.sort_by(|a, b| {
        a.processing_date
            .cmp(&b.processing_date)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });
}

/// In-memory chargeback store. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryChargebackStore {
    records: Arc<RwLock<HashMap<String, ChargebackRecord>>>,
}

impl InMemoryChargebackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ChargebackStore for InMemoryChargebackStore {
    async fn find_existing_chargeback(&self, transaction_id: &str) -> Result<Option<ChargebackRecord>> {
        Ok(self.records.read().await.get(transaction_id).cloned())
    }

    async fn track_new_chargeback(&self, record: ChargebackRecord) -> Result<ChargebackRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.transaction_id) {
            return Err(ChargebackError::DuplicateTransaction {
                transaction_id: record.transaction_id,
            });
        }
        records.insert(record.transaction_id.clone(), record.clone());
        Ok(record)
    }

    async fn update_chargeback_status(
        &self,
        transaction_id: &str,
        status: ChargebackStatus,
        at: DateTime<Utc>,
    ) -> Result<ChargebackRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| ChargebackError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;

        if record.status.is_terminal() {
            return Err(ChargebackError::TerminalStatus {
                transaction_id: transaction_id.to_string(),
                status: record.status,
            });
        }

        record.status = status;
        record.updated_at = Some(at);
        Ok(record.clone())
    }

    async fn mark_notified(&self, transaction_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| ChargebackError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;

        if record.notified_at.is_some() {
            return Ok(false);
        }
        record.notified_at = Some(at);
        Ok(true)
    }

    async fn release_notification(&self, transaction_id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| ChargebackError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;
        record.notified_at = None;
        Ok(())
    }

    async fn list_unnotified(&self) -> Result<Vec<ChargebackRecord>> {
        let records = self.records.read().await;
        let mut unnotified: Vec<ChargebackRecord> = records
            .values()
            .filter(|r| r.status.is_terminal() && r.notified_at.is_none())
            .cloned()
            .collect();
        oldest_first(&mut unnotified);
        Ok(unnotified)
    }

    async fn get_pending_settlements(&self, owner: &Owner) -> Result<Vec<ChargebackRecord>> {
        let records = self.records.read().await;
        let mut pending: Vec<ChargebackRecord> = records
            .values()
            .filter(|r| r.owner == *owner && !r.settled)
            .cloned()
            .collect();
        oldest_first(&mut pending);
        Ok(pending)
    }

    async fn mark_as_settled(&self, partition: &SettlementPartition, settled_date: NaiveDate) -> Result<usize> {
        let mut records = self.records.write().await;

        let mut seen = BTreeSet::new();
        let mut blocked = Vec::new();
        for (id, expected) in partition.expected_statuses() {
            let settleable = records
                .get(id)
                .map_or(false, |r| r.is_settleable() && r.status == expected);
            if !seen.insert(id) || !settleable {
                blocked.push(id.to_string());
            }
        }
        if !blocked.is_empty() {
            return Err(ChargebackError::SettlementConflict { ids: blocked });
        }

        for id in seen {
            if let Some(record) = records.get_mut(id) {
                record.settled = true;
                record.settled_date = Some(settled_date);
            }
        }
        Ok(partition.len())
    }

    async fn get_chargebacks_by_date_range(
        &self,
        owner: &Owner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ChargebackRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<ChargebackRecord> = records
            .values()
            .filter(|r| r.owner == *owner)
            .filter(|r| {
                let day = r.processing_date.date_naive();
                day >= from && day <= to
            })
            .cloned()
            .collect();
        oldest_first(&mut matching);
        Ok(matching)
    }

    async fn list_processing(&self) -> Result<Vec<ChargebackRecord>> {
        let records = self.records.read().await;
        let mut processing: Vec<ChargebackRecord> = records
            .values()
            .filter(|r| r.status == ChargebackStatus::Processing)
            .cloned()
            .collect();
        oldest_first(&mut processing);
        Ok(processing)
    }
}
