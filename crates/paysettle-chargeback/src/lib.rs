//! PaySettle Chargeback - Chargeback lifecycle tracking
//!
//! Each chargeback is keyed by its transaction id and moves through
//!
//! ```text
//! (none) --PROCESSING--> PROCESSING --> APPROVED | DECLINED
//! ```
//!
//! `APPROVED` and `DECLINED` are final. Records stuck in `PROCESSING` past
//! the expiry window are declined by a sweep. Terminal records are picked up
//! by exactly one settlement.

pub mod notifier;
pub mod store;
pub mod tracker;

use thiserror::Error;

use paysettle_types::{ChargebackStatus, SettlementError};

pub use notifier::{ChargebackNotifier, LogNotifier, RecordingNotifier};
pub use store::{ChargebackStore, InMemoryChargebackStore, SettlementPartition};
pub use tracker::{
    ChargebackOutcome, ChargebackSettlementSummary, ChargebackTracker, TrackerConfig, DEFAULT_EXPIRY_DAYS,
};

/// Errors that can occur while tracking chargebacks
#[derive(Error, Debug, Clone)]
pub enum ChargebackError {
    #[error("Chargeback not found: {transaction_id}")]
    NotFound { transaction_id: String },

    #[error("Chargeback already tracked: {transaction_id}")]
    DuplicateTransaction { transaction_id: String },

    #[error("Chargeback {transaction_id} is final with status {status}")]
    TerminalStatus {
        transaction_id: String,
        status: ChargebackStatus,
    },

    #[error("Settlement conflict: chargebacks {ids:?} are not settleable")]
    SettlementConflict { ids: Vec<String> },

    #[error("Invalid chargeback event: {message}")]
    InvalidEvent { message: String },

    #[error("Notification failed: {message}")]
    Notification { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, ChargebackError>;

impl From<ChargebackError> for SettlementError {
    fn from(e: ChargebackError) -> Self {
        match e {
            ChargebackError::SettlementConflict { .. }
            | ChargebackError::TerminalStatus { .. }
            | ChargebackError::DuplicateTransaction { .. } => SettlementError::conflict(e.to_string()),
            ChargebackError::InvalidEvent { message } => SettlementError::invalid_input("chargeback_event", message),
            ChargebackError::NotFound { .. }
            | ChargebackError::Notification { .. }
            | ChargebackError::Storage { .. } => SettlementError::persistence(e.to_string()),
        }
    }
}
