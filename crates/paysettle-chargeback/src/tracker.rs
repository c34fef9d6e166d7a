//! Chargeback tracker
//!
//! Applies acquirer events to tracked records, expires stale `PROCESSING`
//! records and partitions terminal records into settlements.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use paysettle_types::{ChargebackEvent, ChargebackRecord, ChargebackStatus, Currency, MoneyPair, Owner};

use crate::{ChargebackError, ChargebackNotifier, ChargebackStore, Result, SettlementPartition};

/// Days a chargeback may stay `PROCESSING` before it is declined
pub const DEFAULT_EXPIRY_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub expiry_days: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            expiry_days: DEFAULT_EXPIRY_DAYS,
        }
    }
}

impl TrackerConfig {
    pub fn expiry_window(&self) -> Duration {
        Duration::days(i64::from(self.expiry_days))
    }
}

/// What `process_event` did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargebackOutcome {
    /// First `PROCESSING` event, record created
    Created(ChargebackRecord),
    /// Status moved from `from` to the record's current status
    StatusChanged {
        from: ChargebackStatus,
        record: ChargebackRecord,
    },
    /// Event repeated the stored status
    Unchanged(ChargebackRecord),
    /// Terminal event for an untracked transaction, nothing stored
    Ignored,
    /// Event tried to change a final status
    Rejected {
        current: ChargebackStatus,
        requested: ChargebackStatus,
    },
}

/// Result of partitioning an owner's unsettled chargebacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargebackSettlementSummary {
    pub owner: Owner,
    /// Currency scope, `None` for every currency
    pub currency: Option<Currency>,
    pub settlement_date: NaiveDate,
    /// Sum of approved chargebacks in currency units
    pub approved_refunds: Decimal,
    pub approved_refunds_eur: Decimal,
    /// Approved plus declined records in this settlement
    pub processed_count: usize,
    pub approved_ids: Vec<String>,
    pub declined_ids: Vec<String>,
    /// Still `PROCESSING`, left for a later settlement
    pub pending_ids: Vec<String>,
}

impl ChargebackSettlementSummary {
    fn empty(owner: Owner, currency: Option<Currency>, settlement_date: NaiveDate) -> Self {
        Self {
            owner,
            currency,
            settlement_date,
            approved_refunds: Decimal::ZERO,
            approved_refunds_eur: Decimal::ZERO,
            processed_count: 0,
            approved_ids: Vec::new(),
            declined_ids: Vec::new(),
            pending_ids: Vec::new(),
        }
    }

    pub fn approved_refunds(&self) -> MoneyPair {
        MoneyPair::new(self.approved_refunds, self.approved_refunds_eur)
    }

    pub fn partition(&self) -> SettlementPartition {
        SettlementPartition {
            approved: self.approved_ids.clone(),
            declined: self.declined_ids.clone(),
        }
    }
}

pub struct ChargebackTracker {
    store: Arc<dyn ChargebackStore>,
    notifier: Arc<dyn ChargebackNotifier>,
    config: TrackerConfig,
}

impl ChargebackTracker {
    pub fn new(store: Arc<dyn ChargebackStore>, notifier: Arc<dyn ChargebackNotifier>, config: TrackerConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Apply one acquirer event
    pub async fn process_event(&self, event: ChargebackEvent) -> Result<ChargebackOutcome> {
        validate_event(&event)?;

        if let Some(existing) = self.store.find_existing_chargeback(&event.transaction_id).await? {
            return self.apply_status(existing, event.status, event.occurred_at).await;
        }

        if event.status.is_terminal() {
            warn!(
                transaction_id = %event.transaction_id,
                status = %event.status,
                "Terminal event for untracked chargeback ignored"
            );
            return Ok(ChargebackOutcome::Ignored);
        }

        match self.store.track_new_chargeback(ChargebackRecord::from_event(&event)).await {
            Ok(record) => {
                info!(
                    transaction_id = %record.transaction_id,
                    owner = %record.owner,
                    amount = record.amount,
                    currency = %record.currency,
                    "Chargeback tracked"
                );
                Ok(ChargebackOutcome::Created(record))
            }
            Err(ChargebackError::DuplicateTransaction { transaction_id }) => {
                let existing = self
                    .store
                    .find_existing_chargeback(&transaction_id)
                    .await?
                    .ok_or(ChargebackError::NotFound { transaction_id })?;
                self.apply_status(existing, event.status, event.occurred_at).await
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_status(
        &self,
        existing: ChargebackRecord,
        requested: ChargebackStatus,
        at: DateTime<Utc>,
    ) -> Result<ChargebackOutcome> {
        if existing.status == requested {
            debug!(transaction_id = %existing.transaction_id, status = %requested, "Chargeback status unchanged");
            return Ok(ChargebackOutcome::Unchanged(existing));
        }

        if existing.status.is_terminal() {
            warn!(
                transaction_id = %existing.transaction_id,
                current = %existing.status,
                requested = %requested,
                "Status change on final chargeback rejected"
            );
            return Ok(ChargebackOutcome::Rejected {
                current: existing.status,
                requested,
            });
        }

        let record = match self
            .store
            .update_chargeback_status(&existing.transaction_id, requested, at)
            .await
        {
            Ok(record) => record,
            Err(ChargebackError::TerminalStatus { status, .. }) => {
                return Ok(ChargebackOutcome::Rejected {
                    current: status,
                    requested,
                })
            }
            Err(e) => return Err(e),
        };

        info!(
            transaction_id = %record.transaction_id,
            from = %existing.status,
            to = %record.status,
            "Chargeback status changed"
        );
        if record.status.is_terminal() {
            self.notify_once(&record, at).await?;
        }

        Ok(ChargebackOutcome::StatusChanged {
            from: existing.status,
            record,
        })
    }

    /// Fire the terminal notification unless it already fired.
    ///
    /// The claim is recorded before the notifier runs. A failed delivery
    /// gives the claim back and is retried by the next sweep. Returns
    /// whether this call delivered it.
    async fn notify_once(&self, record: &ChargebackRecord, at: DateTime<Utc>) -> Result<bool> {
        if !self.store.mark_notified(&record.transaction_id, at).await? {
            return Ok(false);
        }
        match self.notifier.notify_status_change(record).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(transaction_id = %record.transaction_id, error = %e, "Chargeback notification failed");
                self.store.release_notification(&record.transaction_id).await?;
                Ok(false)
            }
        }
    }

    /// Retry terminal notifications whose delivery failed earlier
    pub async fn redeliver_notifications(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut delivered = 0;
        for record in self.store.list_unnotified().await? {
            if self.notify_once(&record, now).await? {
                delivered += 1;
            }
        }
        if delivered > 0 {
            info!(delivered, "Chargeback notifications redelivered");
        }
        Ok(delivered)
    }

    /// Decline every `PROCESSING` record older than the expiry window.
    ///
    /// Age runs from the processing date to the last update, or to `now`
    /// for records never updated. Failed notifications are retried first.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<ChargebackRecord>> {
        self.redeliver_notifications(now).await?;

        let window = self.config.expiry_window();
        let mut expired = Vec::new();

        for record in self.store.list_processing().await? {
            let age = record.updated_at.unwrap_or(now) - record.processing_date;
            if age <= window {
                continue;
            }

            let declined = match self
                .store
                .update_chargeback_status(&record.transaction_id, ChargebackStatus::Declined, now)
                .await
            {
                Ok(r) => r,
                // Resolved by an event since the listing
                Err(ChargebackError::TerminalStatus { .. }) => continue,
                Err(e) => return Err(e),
            };

            info!(
                transaction_id = %declined.transaction_id,
                age_days = age.num_days(),
                "Stale chargeback expired"
            );
            self.notify_once(&declined, now).await?;
            expired.push(declined);
        }

        Ok(expired)
    }

    /// Partition unsettled chargebacks without marking anything
    pub async fn preview_settlements(
        &self,
        owner: &Owner,
        currency: Option<Currency>,
        settlement_date: NaiveDate,
    ) -> Result<ChargebackSettlementSummary> {
        let mut summary = ChargebackSettlementSummary::empty(*owner, currency, settlement_date);

        for pending in self.store.get_pending_settlements(owner).await? {
            if currency.map_or(false, |c| pending.currency != c) {
                continue;
            }
            // The listing may be stale; decide on the stored record
            let Some(record) = self.store.find_existing_chargeback(&pending.transaction_id).await? else {
                continue;
            };
            if record.settled {
                continue;
            }

            match record.status {
                ChargebackStatus::Processing => summary.pending_ids.push(record.transaction_id),
                ChargebackStatus::Approved => {
                    let amounts = record.amounts();
                    summary.approved_refunds += amounts.original;
                    summary.approved_refunds_eur += amounts.eur;
                    summary.approved_ids.push(record.transaction_id);
                }
                ChargebackStatus::Declined => summary.declined_ids.push(record.transaction_id),
            }
        }

        summary.processed_count = summary.approved_ids.len() + summary.declined_ids.len();
        Ok(summary)
    }

    /// Mark the terminal records of an earlier preview as settled
    pub async fn commit_settlement(&self, summary: &ChargebackSettlementSummary) -> Result<usize> {
        let partition = summary.partition();
        if partition.is_empty() {
            return Ok(0);
        }

        match self.store.mark_as_settled(&partition, summary.settlement_date).await {
            Ok(count) => {
                info!(
                    owner = %summary.owner,
                    settled = count,
                    approved_refunds = %summary.approved_refunds,
                    "Chargebacks settled"
                );
                Ok(count)
            }
            Err(e) => {
                warn!(owner = %summary.owner, error = %e, "Chargeback settlement rejected");
                Err(e)
            }
        }
    }

    /// Partition and settle in one step
    pub async fn process_settlements_chargeback(
        &self,
        owner: &Owner,
        currency: Option<Currency>,
        settlement_date: NaiveDate,
    ) -> Result<ChargebackSettlementSummary> {
        let summary = self.preview_settlements(owner, currency, settlement_date).await?;
        self.commit_settlement(&summary).await?;
        Ok(summary)
    }

    pub async fn get_chargebacks_by_date_range(
        &self,
        owner: &Owner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ChargebackRecord>> {
        if from > to {
            return Ok(Vec::new());
        }
        self.store.get_chargebacks_by_date_range(owner, from, to).await
    }
}

fn validate_event(event: &ChargebackEvent) -> Result<()> {
    if event.transaction_id.trim().is_empty() {
        return Err(ChargebackError::InvalidEvent {
            message: "transaction id is empty".to_string(),
        });
    }
    if event.amount < 0 || event.amount_eur < 0 {
        return Err(ChargebackError::InvalidEvent {
            message: format!("negative amount on {}", event.transaction_id),
        });
    }
    if event.exchange_rate <= Decimal::ZERO {
        return Err(ChargebackError::InvalidEvent {
            message: format!("non-positive exchange rate on {}", event.transaction_id),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryChargebackStore, RecordingNotifier};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use paysettle_types::MerchantId;
    use rust_decimal_macros::dec;

    struct Fixture {
        tracker: ChargebackTracker,
        store: InMemoryChargebackStore,
        notifier: RecordingNotifier,
        owner: Owner,
    }

    fn fixture() -> Fixture {
        let store = InMemoryChargebackStore::new();
        let notifier = RecordingNotifier::new();
        let tracker = ChargebackTracker::new(
            Arc::new(store.clone()),
            Arc::new(notifier.clone()),
            TrackerConfig::default(),
        );
        Fixture {
            tracker,
            store,
            notifier,
            owner: Owner::merchant(MerchantId::new()),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn event(owner: Owner, id: &str, status: ChargebackStatus, at: DateTime<Utc>) -> ChargebackEvent {
        ChargebackEvent {
            transaction_id: id.to_string(),
            owner,
            amount: 5000,
            currency: Currency::EUR,
            amount_eur: 5000,
            exchange_rate: Decimal::ONE,
            status,
            occurred_at: at,
        }
    }

    #[tokio::test]
    async fn test_processing_event_creates_once() {
        let f = fixture();

        let first = f
            .tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();
        let second = f
            .tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();

        assert!(matches!(first, ChargebackOutcome::Created(_)));
        assert!(matches!(second, ChargebackOutcome::Unchanged(_)));
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_event_for_unknown_is_ignored() {
        let f = fixture();

        let outcome = f
            .tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Approved, t0()))
            .await
            .unwrap();

        assert_eq!(outcome, ChargebackOutcome::Ignored);
        assert!(f.store.is_empty().await);
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_status_is_final_and_notified_once() {
        let f = fixture();
        f.tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();

        let approved = f
            .tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Approved, t0() + Duration::days(2)))
            .await
            .unwrap();
        match approved {
            ChargebackOutcome::StatusChanged { from, record } => {
                assert_eq!(from, ChargebackStatus::Processing);
                assert_eq!(record.status, ChargebackStatus::Approved);
                assert_eq!(record.updated_at, Some(t0() + Duration::days(2)));
            }
            other => panic!("expected status change, got {:?}", other),
        }

        let flip = f
            .tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Declined, t0() + Duration::days(3)))
            .await
            .unwrap();
        assert_eq!(
            flip,
            ChargebackOutcome::Rejected {
                current: ChargebackStatus::Approved,
                requested: ChargebackStatus::Declined,
            }
        );

        let repeat = f
            .tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Approved, t0() + Duration::days(4)))
            .await
            .unwrap();
        assert!(matches!(repeat, ChargebackOutcome::Unchanged(_)));

        let stored = f.store.find_existing_chargeback("tx_1").await.unwrap().unwrap();
        assert_eq!(stored.status, ChargebackStatus::Approved);
        assert!(stored.notified_at.is_some());
        assert_eq!(f.notifier.sent().await.len(), 1);
    }

    /// Fails the first `failures` deliveries, then records
    struct FlakyNotifier {
        failures: AtomicUsize,
        inner: RecordingNotifier,
    }

    #[async_trait]
    impl ChargebackNotifier for FlakyNotifier {
        async fn notify_status_change(&self, record: &ChargebackRecord) -> Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(ChargebackError::Notification {
                    message: "downstream unavailable".to_string(),
                });
            }
            self.inner.notify_status_change(record).await
        }
    }

    #[tokio::test]
    async fn test_failed_notification_redelivered_by_sweep() {
        let store = InMemoryChargebackStore::new();
        let sent = RecordingNotifier::new();
        let tracker = ChargebackTracker::new(
            Arc::new(store.clone()),
            Arc::new(FlakyNotifier {
                failures: AtomicUsize::new(1),
                inner: sent.clone(),
            }),
            TrackerConfig::default(),
        );
        let owner = Owner::merchant(MerchantId::new());
        tracker
            .process_event(event(owner, "tx_1", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();
        tracker
            .process_event(event(owner, "tx_1", ChargebackStatus::Approved, t0()))
            .await
            .unwrap();

        assert!(sent.sent().await.is_empty());
        let stored = store.find_existing_chargeback("tx_1").await.unwrap().unwrap();
        assert!(stored.notified_at.is_none());

        tracker.expire_stale(t0() + Duration::days(1)).await.unwrap();
        assert_eq!(sent.sent().await.len(), 1);

        // Delivered once; later sweeps leave it alone
        assert_eq!(tracker.redeliver_notifications(t0() + Duration::days(2)).await.unwrap(), 0);
        assert_eq!(sent.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_event_rejected() {
        let f = fixture();
        let result = f
            .tracker
            .process_event(event(f.owner, " ", ChargebackStatus::Processing, t0()))
            .await;
        assert!(matches!(result, Err(ChargebackError::InvalidEvent { .. })));
    }

    #[tokio::test]
    async fn test_expiry_window() {
        let f = fixture();
        f.tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();

        let early = f.tracker.expire_stale(t0() + Duration::days(13)).await.unwrap();
        assert!(early.is_empty());
        let stored = f.store.find_existing_chargeback("tx_1").await.unwrap().unwrap();
        assert_eq!(stored.status, ChargebackStatus::Processing);

        let late = f.tracker.expire_stale(t0() + Duration::days(15)).await.unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].status, ChargebackStatus::Declined);
        assert_eq!(f.notifier.sent().await.len(), 1);

        // Sweeping again finds nothing and does not re-notify
        assert!(f.tracker.expire_stale(t0() + Duration::days(16)).await.unwrap().is_empty());
        assert_eq!(f.notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_expiry_respects_configured_window() {
        let store = InMemoryChargebackStore::new();
        let tracker = ChargebackTracker::new(
            Arc::new(store.clone()),
            Arc::new(RecordingNotifier::new()),
            TrackerConfig { expiry_days: 30 },
        );
        let owner = Owner::merchant(MerchantId::new());
        tracker
            .process_event(event(owner, "tx_1", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();

        assert!(tracker.expire_stale(t0() + Duration::days(15)).await.unwrap().is_empty());
        assert_eq!(tracker.expire_stale(t0() + Duration::days(31)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settlement_partitioning() {
        let f = fixture();
        for id in ["tx_a", "tx_d", "tx_p"] {
            f.tracker
                .process_event(event(f.owner, id, ChargebackStatus::Processing, t0()))
                .await
                .unwrap();
        }
        f.tracker
            .process_event(event(f.owner, "tx_a", ChargebackStatus::Approved, t0()))
            .await
            .unwrap();
        f.tracker
            .process_event(event(f.owner, "tx_d", ChargebackStatus::Declined, t0()))
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let summary = f
            .tracker
            .process_settlements_chargeback(&f.owner, None, date)
            .await
            .unwrap();

        assert_eq!(summary.processed_count, 2);
        assert_eq!(summary.approved_refunds, dec!(50));
        assert_eq!(summary.approved_refunds_eur, dec!(50));
        assert_eq!(summary.approved_ids, vec!["tx_a".to_string()]);
        assert_eq!(summary.declined_ids, vec!["tx_d".to_string()]);
        assert_eq!(summary.pending_ids, vec!["tx_p".to_string()]);

        let settled = f.store.find_existing_chargeback("tx_d").await.unwrap().unwrap();
        assert!(settled.settled);
        assert_eq!(settled.settled_date, Some(date));

        let next = f
            .tracker
            .process_settlements_chargeback(&f.owner, None, date)
            .await
            .unwrap();
        assert_eq!(next.processed_count, 0);
        assert_eq!(next.pending_ids, vec!["tx_p".to_string()]);
    }

    #[tokio::test]
    async fn test_settlement_scoped_by_currency() {
        let f = fixture();
        let mut usd = event(f.owner, "tx_usd", ChargebackStatus::Processing, t0());
        usd.currency = Currency::USD;
        usd.exchange_rate = dec!(1.08);
        f.tracker.process_event(usd.clone()).await.unwrap();
        usd.status = ChargebackStatus::Approved;
        f.tracker.process_event(usd).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let eur = f
            .tracker
            .preview_settlements(&f.owner, Some(Currency::EUR), date)
            .await
            .unwrap();
        let usd = f
            .tracker
            .preview_settlements(&f.owner, Some(Currency::USD), date)
            .await
            .unwrap();

        assert_eq!(eur.processed_count, 0);
        assert_eq!(usd.processed_count, 1);
    }

    #[tokio::test]
    async fn test_second_commit_conflicts() {
        let f = fixture();
        f.tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();
        f.tracker
            .process_event(event(f.owner, "tx_1", ChargebackStatus::Declined, t0()))
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let summary = f.tracker.preview_settlements(&f.owner, None, date).await.unwrap();

        assert_eq!(f.tracker.commit_settlement(&summary).await.unwrap(), 1);
        assert!(matches!(
            f.tracker.commit_settlement(&summary).await,
            Err(ChargebackError::SettlementConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_date_range_lookup() {
        let f = fixture();
        f.tracker
            .process_event(event(f.owner, "tx_march", ChargebackStatus::Processing, t0()))
            .await
            .unwrap();
        f.tracker
            .process_event(event(
                f.owner,
                "tx_april",
                ChargebackStatus::Processing,
                t0() + Duration::days(40),
            ))
            .await
            .unwrap();

        let march = f
            .tracker
            .get_chargebacks_by_date_range(
                &f.owner,
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(march.len(), 1);
        assert_eq!(march[0].transaction_id, "tx_march");
    }
}
