//! Repository implementations of the settlement persistence ports

pub mod chargeback;
pub mod reserve;

pub use chargeback::PgChargebackStore;
pub use reserve::PgReserveStore;
