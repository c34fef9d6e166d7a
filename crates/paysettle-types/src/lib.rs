//! PaySettle Types - Canonical domain types for merchant settlement
//!
//! This crate contains the foundational types shared by every PaySettle
//! crate and depends on no other PaySettle crate. It defines:
//!
//! - Owner identity (merchant, optional shop)
//! - Currencies, settlement periods and money helpers
//! - Transaction aggregates handed in by the upstream collector
//! - Fee configuration and applied fees
//! - Rolling reserve entries and chargeback records
//! - The per-currency settlement block
//!
//! # Invariants
//!
//! 1. Persisted ledger amounts are integer minor units
//! 2. Every original-currency figure has an independently computed EUR twin
//! 3. A reserve entry has `released_at` set exactly when it is released
//! 4. A chargeback can only be settled once its status is terminal

pub mod identity;
pub mod currency;
pub mod amount;
pub mod period;
pub mod transaction;
pub mod fee;
pub mod reserve;
pub mod chargeback;
pub mod settlement;
pub mod error;

pub use identity::*;
pub use currency::*;
pub use amount::*;
pub use period::*;
pub use transaction::*;
pub use fee::*;
pub use reserve::*;
pub use chargeback::*;
pub use settlement::*;
pub use error::*;

/// Version of the PaySettle types schema
pub const TYPES_VERSION: &str = "0.1.0";
