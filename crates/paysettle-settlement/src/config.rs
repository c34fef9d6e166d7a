//! Settlement configuration
//!
//! Loaded from an optional config file, then overridden by `PAYSETTLE_*`
//! environment variables (after reading `.env` if present).

use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use paysettle_chargeback::TrackerConfig;
use paysettle_types::ReserveSettings;

pub const ENV_RESERVE_PERCENTAGE: &str = "PAYSETTLE_RESERVE_PERCENTAGE";
pub const ENV_RESERVE_HOLDING_MONTHS: &str = "PAYSETTLE_RESERVE_HOLDING_MONTHS";
pub const ENV_CHARGEBACK_EXPIRY_DAYS: &str = "PAYSETTLE_CHARGEBACK_EXPIRY_DAYS";
pub const ENV_LOG_LEVEL: &str = "PAYSETTLE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "PAYSETTLE_LOG_FORMAT";

/// Settlement engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Reserve terms for owners without their own settings
    pub reserve: ReserveSettings,

    /// Chargeback expiry window
    pub chargeback: TrackerConfig,

    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl SettlementConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::File::with_name("config/paysettle").required(false));

        let mut config: SettlementConfig = builder
            .build()
            .context("failed to read settlement configuration")?
            .try_deserialize()
            .context("invalid settlement configuration")?;

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables only
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(None)
    }

    /// Apply `PAYSETTLE_*` overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(pct) = parse_var::<Decimal, _>(&lookup, ENV_RESERVE_PERCENTAGE)? {
            self.reserve.percentage = pct;
        }
        if let Some(months) = parse_var::<u32, _>(&lookup, ENV_RESERVE_HOLDING_MONTHS)? {
            self.reserve.holding_period_months = months;
        }
        if let Some(days) = parse_var::<u32, _>(&lookup, ENV_CHARGEBACK_EXPIRY_DAYS)? {
            self.chargeback.expiry_days = days;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reserve.percentage < Decimal::ZERO || self.reserve.percentage > Decimal::ONE_HUNDRED {
            anyhow::bail!(
                "reserve percentage must be within 0..=100, got {}",
                self.reserve.percentage
            );
        }
        if self.chargeback.expiry_days == 0 {
            anyhow::bail!("chargeback expiry window must be at least one day");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!("unknown log format {:?}", self.logging.format);
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}={:?}: {}", name, raw, e)),
        None => Ok(None),
    }
}
