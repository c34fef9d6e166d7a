//! Applicability conditions
//!
//! A missing setting makes a leaf predicate false. A setting that is
//! present but cannot be read the way the condition needs is a malformed
//! condition and fails the fee it belongs to.

use std::str::FromStr;

use rust_decimal::Decimal;

use paysettle_types::{FeeCondition, OwnerSettings};

/// Evaluate a condition, returning the reason when it is malformed
pub fn evaluate(condition: &FeeCondition, settings: &OwnerSettings) -> Result<bool, String> {
    match condition {
        FeeCondition::Always => Ok(true),
        FeeCondition::SettingEquals { key, value } => {
            require_key(key)?;
            Ok(settings.get(key) == Some(value.as_str()))
        }
        FeeCondition::SettingEnabled { key } => {
            require_key(key)?;
            Ok(matches!(
                settings.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
                Some("true") | Some("1")
            ))
        }
        FeeCondition::SettingAtLeast { key, threshold } => {
            require_key(key)?;
            match settings.get(key) {
                None => Ok(false),
                Some(raw) => {
                    let value = Decimal::from_str(raw.trim())
                        .map_err(|_| format!("setting '{}' = '{}' is not numeric", key, raw))?;
                    Ok(value >= *threshold)
                }
            }
        }
        FeeCondition::Not { condition } => Ok(!evaluate(condition, settings)?),
        FeeCondition::All { conditions } => {
            for c in conditions {
                if !evaluate(c, settings)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        FeeCondition::Any { conditions } => {
            for c in conditions {
                if evaluate(c, settings)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn require_key(key: &str) -> Result<(), String> {
    if key.trim().is_empty() {
        return Err("condition references an empty setting key".to_string());
    }
    Ok(())
}
