//! Fee configuration and applied-fee types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Currency, Owner, SettlementPeriod};

/// How often a configured fee may be charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeFrequency {
    Transaction,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    OneTime,
}

impl FeeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::OneTime => "one_time",
        }
    }
}

impl fmt::Display for FeeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate over owner settings deciding whether a fee applies at all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeCondition {
    Always,
    /// Setting is present and equal to `value`
    SettingEquals { key: String, value: String },
    /// Setting is present and reads as "true" or "1"
    SettingEnabled { key: String },
    /// Setting is present and numerically >= `threshold`
    SettingAtLeast { key: String, threshold: Decimal },
    Not { condition: Box<FeeCondition> },
    All { conditions: Vec<FeeCondition> },
    Any { conditions: Vec<FeeCondition> },
}

/// Per-owner settings fee conditions are evaluated against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSettings {
    pub owner: Owner,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl OwnerSettings {
    pub fn new(owner: Owner) -> Self {
        Self {
            owner,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A named fee definition, read-only to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfiguration {
    /// Unique key, also used for strategy dispatch
    pub key: String,
    pub name: String,
    /// Minor units, or basis points when `is_percentage` is set
    pub amount: i64,
    #[serde(default)]
    pub is_percentage: bool,
    pub frequency: FeeFrequency,
    #[serde(default)]
    pub condition: Option<FeeCondition>,
}

impl FeeConfiguration {
    pub fn new(key: impl Into<String>, amount: i64, frequency: FeeFrequency) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            amount,
            is_percentage: false,
            frequency,
            condition: None,
        }
    }

    pub fn percentage(mut self) -> Self {
        self.is_percentage = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn when(mut self, condition: FeeCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Where an applied fee came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeOrigin {
    /// Produced by the fee engine from a registered configuration
    Configured,
    /// Ad hoc fee merged in by the caller
    Custom,
}

/// A fee charged in one settlement run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFee {
    pub fee_key: String,
    pub name: String,
    pub owner: Owner,
    pub period: SettlementPeriod,
    pub currency: Currency,
    /// Currency units of `currency`
    pub amount: Decimal,
    pub amount_eur: Decimal,
    pub frequency: FeeFrequency,
    pub origin: FeeOrigin,
    pub applied_at: DateTime<Utc>,
}
