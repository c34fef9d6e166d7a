//! Error types for PaySettle
//!
//! Batch-fatal errors for a currency block. Per-fee configuration errors
//! live in `paysettle-fees` and never reach this type.

use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    // ========================================================================
    // Data Errors
    // ========================================================================

    /// No exchange rate for a non-EUR block
    #[error("Missing exchange rate for currency {currency}")]
    MissingExchangeRate { currency: String },

    /// Input in a different currency than the block
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    // ========================================================================
    // Persistence Errors
    // ========================================================================

    /// Backing store failed
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Concurrent release/settle of the same ids
    #[error("Conflict: {message}")]
    Conflict { message: String },

    // ========================================================================
    // Boundary Errors
    // ========================================================================

    /// Reported to callers without internal detail. `cause` is the error
    /// code of the underlying failure and decides retriability.
    #[error("Settlement generation failed for owner {owner}, period {period}")]
    GenerationFailed {
        owner: String,
        period: String,
        cause: &'static str,
        retriable: bool,
    },
}

impl SettlementError {
    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Wrap a failure for the caller, keeping its code and retriability
    pub fn generation_failed(owner: impl Into<String>, period: impl Into<String>, cause: &SettlementError) -> Self {
        Self::GenerationFailed {
            owner: owner.into(),
            period: period.into(),
            cause: cause.cause_code(),
            retriable: cause.is_retriable(),
        }
    }

    /// Whether the caller may retry the owner/period unit
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Persistence { .. } => true,
            Self::GenerationFailed { retriable, .. } => *retriable,
            _ => false,
        }
    }

    /// Code of the root failure; looks through `GenerationFailed`
    pub fn cause_code(&self) -> &'static str {
        match self {
            Self::GenerationFailed { cause, .. } => *cause,
            other => other.error_code(),
        }
    }

    /// Get an error code for reports and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingExchangeRate { .. } => "MISSING_EXCHANGE_RATE",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::GenerationFailed { .. } => "GENERATION_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SettlementError::MissingExchangeRate {
            currency: "USD".to_string(),
        };
        assert_eq!(err.error_code(), "MISSING_EXCHANGE_RATE");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(SettlementError::persistence("connection reset").is_retriable());
        assert!(!SettlementError::conflict("already released").is_retriable());
        assert!(!SettlementError::AmountOverflow.is_retriable());
    }

    #[test]
    fn test_generation_failed_hides_detail() {
        let err = SettlementError::generation_failed(
            "merchant_1",
            "2025-01-01..2025-01-31",
            &SettlementError::persistence("connection reset"),
        );
        assert_eq!(
            err.to_string(),
            "Settlement generation failed for owner merchant_1, period 2025-01-01..2025-01-31"
        );
        assert!(err.is_retriable());
        assert_eq!(err.cause_code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn test_generation_failed_keeps_data_errors_final() {
        let missing_rate = SettlementError::MissingExchangeRate {
            currency: "USD".to_string(),
        };
        let err = SettlementError::generation_failed("merchant_1", "2025-01", &missing_rate);

        assert!(!err.is_retriable());
        assert_eq!(err.error_code(), "GENERATION_FAILED");
        assert_eq!(err.cause_code(), "MISSING_EXCHANGE_RATE");

        let mismatch = SettlementError::CurrencyMismatch {
            expected: "EUR".to_string(),
            actual: "USD".to_string(),
        };
        assert!(!SettlementError::generation_failed("merchant_1", "2025-01", &mismatch).is_retriable());
    }
}
