//! PaySettle Settlement - Per-currency settlement blocks
//!
//! Combines the fee engine, the rolling reserve ledger and the chargeback
//! tracker into one settlement block per owner, currency and period.
//!
//! - [`aggregator`] is the pure block computation
//! - [`service`] orchestrates one block in prepare and commit phases
//! - [`config`] and [`telemetry`] carry the runtime setup

pub mod aggregator;
pub mod config;
pub mod service;
pub mod telemetry;

pub use aggregator::{aggregate_block, foreign_exchange_fee, BlockInputs};
pub use config::{LoggingConfig, SettlementConfig};
pub use service::{
    BlockRequest, CommitReport, CustomFeeSource, NoCustomFees, PreparedBlock, SettledBlock, SettlementService,
};
pub use telemetry::init_tracing;
