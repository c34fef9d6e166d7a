//! Chargeback types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Currency, MoneyPair, Owner};

/// Chargeback lifecycle status.
///
/// `Approved` favors the cardholder, `Declined` favors the merchant. Both
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargebackStatus {
    Processing,
    Approved,
    Declined,
}

impl ChargebackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Declined)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Approved => "APPROVED",
            Self::Declined => "DECLINED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSING" => Some(Self::Processing),
            "APPROVED" => Some(Self::Approved),
            "DECLINED" => Some(Self::Declined),
            _ => None,
        }
    }
}

impl fmt::Display for ChargebackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chargeback notification from the acquirer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargebackEvent {
    pub transaction_id: String,
    pub owner: Owner,
    /// Minor units of `currency`
    pub amount: i64,
    pub currency: Currency,
    /// Minor units of EUR
    pub amount_eur: i64,
    pub exchange_rate: Decimal,
    pub status: ChargebackStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Tracked state of one chargeback, keyed by transaction id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargebackRecord {
    pub transaction_id: String,
    pub owner: Owner,
    pub amount: i64,
    pub currency: Currency,
    pub amount_eur: i64,
    pub exchange_rate: Decimal,
    pub status: ChargebackStatus,
    pub settled: bool,
    pub settled_date: Option<NaiveDate>,
    pub processing_date: DateTime<Utc>,
    /// Last status change, `None` until the first one
    pub updated_at: Option<DateTime<Utc>>,
    /// Set once the terminal-status notification has fired
    pub notified_at: Option<DateTime<Utc>>,
}

impl ChargebackRecord {
    /// Start tracking from a first `PROCESSING` event
    pub fn from_event(event: &ChargebackEvent) -> Self {
        Self {
            transaction_id: event.transaction_id.clone(),
            owner: event.owner,
            amount: event.amount,
            currency: event.currency,
            amount_eur: event.amount_eur,
            exchange_rate: event.exchange_rate,
            status: event.status,
            settled: false,
            settled_date: None,
            processing_date: event.occurred_at,
            updated_at: None,
            notified_at: None,
        }
    }

    pub fn amounts(&self) -> MoneyPair {
        MoneyPair::from_minor(self.amount, self.amount_eur)
    }

    /// Terminal and not yet part of a settlement
    pub fn is_settleable(&self) -> bool {
        self.status.is_terminal() && !self.settled
    }
}
