//! Downstream notification of terminal chargeback outcomes

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use paysettle_types::ChargebackRecord;

use crate::Result;

/// Receives a record once it reaches `APPROVED` or `DECLINED`
#[async_trait]
pub trait ChargebackNotifier: Send + Sync {
    async fn notify_status_change(&self, record: &ChargebackRecord) -> Result<()>;
}

/// Drops notifications, logging them at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl ChargebackNotifier for LogNotifier {
    async fn notify_status_change(&self, record: &ChargebackRecord) -> Result<()> {
        debug!(
            transaction_id = %record.transaction_id,
            owner = %record.owner,
            status = %record.status,
            "Chargeback notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<ChargebackRecord>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<ChargebackRecord> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl ChargebackNotifier for RecordingNotifier {
    async fn notify_status_change(&self, record: &ChargebackRecord) -> Result<()> {
        self.sent.write().await.push(record.clone());
        Ok(())
    }
}
