//! Rolling reserve repository

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use paysettle_reserve::{NewReserveEntry, ReserveError, ReserveStore, Result};
use paysettle_types::{Currency, Owner, ReserveEntryId, ReserveSettings, RollingReserveEntry, SettlementPeriod};

use crate::{owner_columns, DbError, DbReserveEntry, DbReserveSettings, DbResult};

const OWNER_MATCH: &str = "merchant_id = $1 AND shop_id IS NOT DISTINCT FROM $2";

pub struct PgReserveStore {
    pool: PgPool,
}

impl PgReserveStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_entries(rows: Vec<DbReserveEntry>) -> DbResult<Vec<RollingReserveEntry>> {
    rows.into_iter().map(RollingReserveEntry::try_from).collect()
}

#[async_trait]
impl ReserveStore for PgReserveStore {
    async fn get_merchant_reserve_settings(&self, owner: &Owner) -> Result<Option<ReserveSettings>> {
        let (merchant_id, shop_id) = owner_columns(owner);
        let row = sqlx::query_as::<_, DbReserveSettings>(&format!(
            "SELECT merchant_id, shop_id, percentage, holding_period_months FROM merchant_reserve_settings WHERE {}",
            OWNER_MATCH
        ))
        .bind(merchant_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(row.map(ReserveSettings::try_from).transpose()?)
    }

    async fn find_entry(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Option<RollingReserveEntry>> {
        let (merchant_id, shop_id) = owner_columns(owner);
        let row = sqlx::query_as::<_, DbReserveEntry>(&format!(
            "SELECT * FROM rolling_reserve_entries WHERE {} AND original_currency = $3 \
             AND period_start = $4 AND period_end = $5 AND deleted_at IS NULL",
            OWNER_MATCH
        ))
        .bind(merchant_id)
        .bind(shop_id)
        .bind(currency.code())
        .bind(period.start)
        .bind(period.end)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(row.map(RollingReserveEntry::try_from).transpose()?)
    }

    async fn insert_entry(&self, entry: NewReserveEntry) -> Result<RollingReserveEntry> {
        let (merchant_id, shop_id) = owner_columns(&entry.owner);
        let inserted = sqlx::query_as::<_, DbReserveEntry>(
            r#"
            INSERT INTO rolling_reserve_entries (
                merchant_id, shop_id, original_amount, original_currency, reserve_amount_eur,
                exchange_rate, period_start, period_end, release_due_date, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10)
            RETURNING *
            "#,
        )
        .bind(merchant_id)
        .bind(shop_id)
        .bind(entry.original_amount)
        .bind(entry.original_currency.code())
        .bind(entry.reserve_amount_eur)
        .bind(entry.exchange_rate)
        .bind(entry.period.start)
        .bind(entry.period.end)
        .bind(entry.release_due_date)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from);

        match inserted {
            Ok(row) => Ok(RollingReserveEntry::try_from(row)?),
            Err(e) if e.is_unique_violation() => Err(ReserveError::DuplicateEntry {
                owner: entry.owner.to_string(),
                currency: entry.original_currency.to_string(),
                period: entry.period.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_releasable(
        &self,
        owner: &Owner,
        currency: Option<Currency>,
        as_of: NaiveDate,
    ) -> Result<Vec<RollingReserveEntry>> {
        let (merchant_id, shop_id) = owner_columns(owner);
        let rows = sqlx::query_as::<_, DbReserveEntry>(&format!(
            "SELECT * FROM rolling_reserve_entries WHERE {} \
             AND status = 'pending' AND released_at IS NULL AND deleted_at IS NULL \
             AND release_due_date <= $3 AND ($4::text IS NULL OR original_currency = $4) \
             ORDER BY id",
            OWNER_MATCH
        ))
        .bind(merchant_id)
        .bind(shop_id)
        .bind(as_of)
        .bind(currency.map(|c| c.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(decode_entries(rows)?)
    }

    async fn list_released_for(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Vec<RollingReserveEntry>> {
        let (merchant_id, shop_id) = owner_columns(owner);
        let rows = sqlx::query_as::<_, DbReserveEntry>(&format!(
            "SELECT * FROM rolling_reserve_entries WHERE {} \
             AND status = 'released' AND deleted_at IS NULL AND original_currency = $3 \
             AND released_for_start = $4 AND released_for_end = $5 \
             ORDER BY id",
            OWNER_MATCH
        ))
        .bind(merchant_id)
        .bind(shop_id)
        .bind(currency.code())
        .bind(period.start)
        .bind(period.end)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(decode_entries(rows)?)
    }

    async fn mark_released(
        &self,
        ids: &[ReserveEntryId],
        period: &SettlementPeriod,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let wanted: BTreeSet<ReserveEntryId> = ids.iter().copied().collect();
        let wanted_ids: Vec<ReserveEntryId> = wanted.iter().copied().collect();

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        // Lock the pending rows; anything missing from the result is not releasable
        let locked: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM rolling_reserve_entries \
             WHERE id = ANY($1) AND status = 'pending' AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(wanted_ids.as_slice())
        .fetch_all(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let locked: BTreeSet<ReserveEntryId> = locked.into_iter().map(|(id,)| id).collect();
        let blocked: Vec<ReserveEntryId> = wanted.difference(&locked).copied().collect();
        if !blocked.is_empty() {
            tx.rollback().await.map_err(DbError::from)?;
            return Err(ReserveError::ReleaseConflict { ids: blocked });
        }

        let updated = sqlx::query(
            "UPDATE rolling_reserve_entries SET status = 'released', released_at = $2, \
             released_for_start = $3, released_for_end = $4 WHERE id = ANY($1)",
        )
        .bind(wanted_ids.as_slice())
        .bind(at)
        .bind(period.start)
        .bind(period.end)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;

        Ok(updated.rows_affected() as usize)
    }

    async fn soft_delete(&self, id: ReserveEntryId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE rolling_reserve_entries SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(ReserveError::EntryNotFound { id });
        }
        Ok(())
    }

    async fn list_entries(&self, owner: &Owner) -> Result<Vec<RollingReserveEntry>> {
        let (merchant_id, shop_id) = owner_columns(owner);
        let rows = sqlx::query_as::<_, DbReserveEntry>(&format!(
            "SELECT * FROM rolling_reserve_entries WHERE {} AND deleted_at IS NULL ORDER BY id",
            OWNER_MATCH
        ))
        .bind(merchant_id)
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(decode_entries(rows)?)
    }
}
