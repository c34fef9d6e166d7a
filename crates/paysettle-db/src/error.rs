//! Database error types

use thiserror::Error;

use paysettle_chargeback::ChargebackError;
use paysettle_reserve::ReserveError;

/// PostgreSQL error code for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Invalid row: {0}")]
    Decode(String),
}

impl DbError {
    /// Whether the error is a unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Query(e) => e
                .as_database_error()
                .and_then(|d| d.code())
                .map_or(false, |code| code == UNIQUE_VIOLATION),
            _ => false,
        }
    }
}

impl From<DbError> for ReserveError {
    fn from(e: DbError) -> Self {
        ReserveError::Storage { message: e.to_string() }
    }
}

impl From<DbError> for ChargebackError {
    fn from(e: DbError) -> Self {
        ChargebackError::Storage { message: e.to_string() }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
