//! Chargeback repository

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use paysettle_chargeback::{ChargebackError, ChargebackStore, Result, SettlementPartition};
use paysettle_types::{ChargebackRecord, ChargebackStatus, Owner};

use crate::{owner_columns, DbChargeback, DbError, DbResult};

pub struct PgChargebackStore {
    pool: PgPool,
}

impl PgChargebackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_records(rows: Vec<DbChargeback>) -> DbResult<Vec<ChargebackRecord>> {
    rows.into_iter().map(ChargebackRecord::try_from).collect()
}

#[async_trait]
impl ChargebackStore for PgChargebackStore {
    async fn find_existing_chargeback(&self, transaction_id: &str) -> Result<Option<ChargebackRecord>> {
        let row = sqlx::query_as::<_, DbChargeback>("SELECT * FROM chargebacks WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(row.map(ChargebackRecord::try_from).transpose()?)
    }

    async fn track_new_chargeback(&self, record: ChargebackRecord) -> Result<ChargebackRecord> {
        let (merchant_id, shop_id) = owner_columns(&record.owner);
        let row = sqlx::query_as::<_, DbChargeback>(
            r#"
            INSERT INTO chargebacks (
                transaction_id, merchant_id, shop_id, amount, currency, amount_eur,
                exchange_rate, status, settled, processing_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&record.transaction_id)
        .bind(merchant_id)
        .bind(shop_id)
        .bind(record.amount)
        .bind(record.currency.code())
        .bind(record.amount_eur)
        .bind(record.exchange_rate)
        .bind(record.status.as_str())
        .bind(record.processing_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| ChargebackError::DuplicateTransaction {
            transaction_id: record.transaction_id.clone(),
        })?;

        Ok(ChargebackRecord::try_from(row)?)
    }

    async fn update_chargeback_status(
        &self,
        transaction_id: &str,
        status: ChargebackStatus,
        at: DateTime<Utc>,
    ) -> Result<ChargebackRecord> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM chargebacks WHERE transaction_id = $1 FOR UPDATE")
                .bind(transaction_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DbError::from)?;

        let (current,) = current.ok_or_else(|| ChargebackError::NotFound {
            transaction_id: transaction_id.to_string(),
        })?;
        let current = ChargebackStatus::parse(&current)
            .ok_or_else(|| DbError::Decode(format!("chargeback {} has status {:?}", transaction_id, current)))?;
        if current.is_terminal() {
            tx.rollback().await.map_err(DbError::from)?;
            return Err(ChargebackError::TerminalStatus {
                transaction_id: transaction_id.to_string(),
                status: current,
            });
        }

        let row = sqlx::query_as::<_, DbChargeback>(
            "UPDATE chargebacks SET status = $2, updated_at = $3 WHERE transaction_id = $1 RETURNING *",
        )
        .bind(transaction_id)
        .bind(status.as_str())
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;

        Ok(ChargebackRecord::try_from(row)?)
    }

    async fn mark_notified(&self, transaction_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE chargebacks SET notified_at = $2 WHERE transaction_id = $1 AND notified_at IS NULL",
        )
        .bind(transaction_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.find_existing_chargeback(transaction_id).await? {
            Some(_) => Ok(false),
            None => Err(ChargebackError::NotFound {
                transaction_id: transaction_id.to_string(),
            }),
        }
    }

    async fn release_notification(&self, transaction_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE chargebacks SET notified_at = NULL WHERE transaction_id = $1")
            .bind(transaction_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(ChargebackError::NotFound {
                transaction_id: transaction_id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_unnotified(&self) -> Result<Vec<ChargebackRecord>> {
        let rows = sqlx::query_as::<_, DbChargeback>(
            "SELECT * FROM chargebacks WHERE notified_at IS NULL AND status IN ('APPROVED', 'DECLINED') \
             ORDER BY processing_date, transaction_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(decode_records(rows)?)
    }

    async fn get_pending_settlements(&self, owner: &Owner) -> Result<Vec<ChargebackRecord>> {
        let (merchant_id, shop_id) = owner_columns(owner);
        let rows = sqlx::query_as::<_, DbChargeback>(
            "SELECT * FROM chargebacks WHERE merchant_id = $1 AND shop_id IS NOT DISTINCT FROM $2 \
             AND settled = FALSE ORDER BY processing_date, transaction_id",
        )
        .bind(merchant_id)
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(decode_records(rows)?)
    }

    async fn mark_as_settled(&self, partition: &SettlementPartition, settled_date: NaiveDate) -> Result<usize> {
        let mut seen = BTreeSet::new();
        let mut blocked = Vec::new();
        for (id, _) in partition.expected_statuses() {
            if !seen.insert(id.to_string()) {
                blocked.push(id.to_string());
            }
        }
        let ids: Vec<String> = seen.into_iter().collect();

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let locked: Vec<(String, String)> = sqlx::query_as(
            "SELECT transaction_id, status FROM chargebacks \
             WHERE transaction_id = ANY($1) AND settled = FALSE FOR UPDATE",
        )
        .bind(ids.as_slice())
        .fetch_all(&mut *tx)
        .await
        .map_err(DbError::from)?;
        let locked: HashMap<String, String> = locked.into_iter().collect();

        for (id, expected) in partition.expected_statuses() {
            if locked.get(id).map(String::as_str) != Some(expected.as_str()) && !blocked.iter().any(|b| b == id) {
                blocked.push(id.to_string());
            }
        }
        if !blocked.is_empty() {
            tx.rollback().await.map_err(DbError::from)?;
            return Err(ChargebackError::SettlementConflict { ids: blocked });
        }

        let updated = sqlx::query(
            "UPDATE chargebacks SET settled = TRUE, settled_date = $2 WHERE transaction_id = ANY($1)",
        )
        .bind(ids.as_slice())
        .bind(settled_date)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;

        Ok(updated.rows_affected() as usize)
    }

    async fn get_chargebacks_by_date_range(
        &self,
        owner: &Owner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ChargebackRecord>> {
        let (merchant_id, shop_id) = owner_columns(owner);
        let rows = sqlx::query_as::<_, DbChargeback>(
            "SELECT * FROM chargebacks WHERE merchant_id = $1 AND shop_id IS NOT DISTINCT FROM $2 \
             AND (processing_date AT TIME ZONE 'UTC')::date BETWEEN $3 AND $4 \
             ORDER BY processing_date, transaction_id",
        )
        .bind(merchant_id)
        .bind(shop_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(decode_records(rows)?)
    }

    async fn list_processing(&self) -> Result<Vec<ChargebackRecord>> {
        let rows = sqlx::query_as::<_, DbChargeback>(
            "SELECT * FROM chargebacks WHERE status = 'PROCESSING' ORDER BY processing_date, transaction_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(decode_records(rows)?)
    }
}
