//! Database models - mapped from PostgreSQL tables

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use paysettle_types::{
    ChargebackRecord, ChargebackStatus, Currency, MerchantId, Owner, ReserveSettings, ReserveStatus,
    RollingReserveEntry, SettlementPeriod, ShopId,
};

use crate::{DbError, DbResult};

fn owner_from_row(merchant_id: Uuid, shop_id: Option<Uuid>) -> Owner {
    Owner {
        merchant_id: MerchantId::from_uuid(merchant_id),
        shop_id: shop_id.map(ShopId::from_uuid),
    }
}

fn currency_from_row(code: &str) -> DbResult<Currency> {
    code.parse()
        .map_err(|_| DbError::Decode(format!("unknown currency {:?}", code)))
}

/// Owner columns as bound into queries
pub fn owner_columns(owner: &Owner) -> (Uuid, Option<Uuid>) {
    (*owner.merchant_id.as_uuid(), owner.shop_id.map(|s| *s.as_uuid()))
}

// ============================================================================
// Rolling Reserve Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbReserveEntry {
    pub id: i64,
    pub merchant_id: Uuid,
    pub shop_id: Option<Uuid>,
    pub original_amount: i64,
    pub original_currency: String,
    pub reserve_amount_eur: i64,
    pub exchange_rate: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub release_due_date: NaiveDate,
    pub status: String,
    pub released_at: Option<DateTime<Utc>>,
    pub released_for_start: Option<NaiveDate>,
    pub released_for_end: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbReserveEntry> for RollingReserveEntry {
    type Error = DbError;

    fn try_from(row: DbReserveEntry) -> DbResult<Self> {
        let status = ReserveStatus::parse(&row.status)
            .ok_or_else(|| DbError::Decode(format!("reserve {} has status {:?}", row.id, row.status)))?;
        let released_for = match (row.released_for_start, row.released_for_end) {
            (Some(start), Some(end)) => Some(
                SettlementPeriod::new(start, end)
                    .map_err(|e| DbError::Decode(format!("reserve {} release period: {}", row.id, e)))?,
            ),
            (None, None) => None,
            _ => {
                return Err(DbError::Decode(format!(
                    "reserve {} has a half-set release period",
                    row.id
                )))
            }
        };
        Ok(Self {
            id: row.id,
            owner: owner_from_row(row.merchant_id, row.shop_id),
            original_amount: row.original_amount,
            original_currency: currency_from_row(&row.original_currency)?,
            reserve_amount_eur: row.reserve_amount_eur,
            exchange_rate: row.exchange_rate,
            period_start: row.period_start,
            period_end: row.period_end,
            release_due_date: row.release_due_date,
            status,
            released_at: row.released_at,
            released_for,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbReserveSettings {
    pub merchant_id: Uuid,
    pub shop_id: Option<Uuid>,
    pub percentage: Decimal,
    pub holding_period_months: i32,
}

impl TryFrom<DbReserveSettings> for ReserveSettings {
    type Error = DbError;

    fn try_from(row: DbReserveSettings) -> DbResult<Self> {
        let holding_period_months = u32::try_from(row.holding_period_months).map_err(|_| {
            DbError::Decode(format!(
                "negative holding period {} for merchant {}",
                row.holding_period_months, row.merchant_id
            ))
        })?;
        Ok(Self {
            percentage: row.percentage,
            holding_period_months,
        })
    }
}

// ============================================================================
// Chargeback Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbChargeback {
    pub transaction_id: String,
    pub merchant_id: Uuid,
    pub shop_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub amount_eur: i64,
    pub exchange_rate: Decimal,
    pub status: String,
    pub settled: bool,
    pub settled_date: Option<NaiveDate>,
    pub processing_date: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbChargeback> for ChargebackRecord {
    type Error = DbError;

    fn try_from(row: DbChargeback) -> DbResult<Self> {
        let status = ChargebackStatus::parse(&row.status).ok_or_else(|| {
            DbError::Decode(format!("chargeback {} has status {:?}", row.transaction_id, row.status))
        })?;
        Ok(Self {
            owner: owner_from_row(row.merchant_id, row.shop_id),
            currency: currency_from_row(&row.currency)?,
            transaction_id: row.transaction_id,
            amount: row.amount,
            amount_eur: row.amount_eur,
            exchange_rate: row.exchange_rate,
            status,
            settled: row.settled,
            settled_date: row.settled_date,
            processing_date: row.processing_date,
            updated_at: row.updated_at,
            notified_at: row.notified_at,
        })
    }
}
