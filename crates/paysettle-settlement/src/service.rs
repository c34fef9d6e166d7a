//! Settlement service
//!
//! Runs one (owner, currency, period) block through the fee engine, the
//! reserve ledger and the chargeback tracker, then aggregates the result.
//!
//! Settlement happens in two phases:
//!
//! 1. `prepare_block` reads and creates idempotently. Running it twice on
//!    the same inputs yields the same block and writes nothing new, also
//!    after the block was committed: reserves the block already paid out
//!    are counted again.
//! 2. `commit_block` settles the chargebacks and releases the reserves the
//!    prepared block counted. Committing the same block twice is a conflict.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use paysettle_chargeback::{ChargebackNotifier, ChargebackSettlementSummary, ChargebackStore, ChargebackTracker};
use paysettle_fees::{partition_outcomes, FeeContext, FeeEngine, FeeError};
use paysettle_reserve::{CreateReserveRequest, ReserveCreation, RollingReserveLedger};
use paysettle_types::{
    AppliedFee, ChargebackRecord, Currency, Owner, OwnerSettings, ReserveEntryId, Result, SettlementBlock,
    SettlementError, SettlementPeriod, TransactionAggregate,
};

use crate::aggregator::{aggregate_block, BlockInputs};
use crate::config::SettlementConfig;

/// Source of ad hoc fees entered outside the fee configuration
#[async_trait]
pub trait CustomFeeSource: Send + Sync {
    async fn custom_fees(
        &self,
        owner: &Owner,
        currency: Currency,
        period: &SettlementPeriod,
    ) -> Result<Vec<AppliedFee>>;
}

/// No custom fees
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCustomFees;

#[async_trait]
impl CustomFeeSource for NoCustomFees {
    async fn custom_fees(&self, _: &Owner, _: Currency, _: &SettlementPeriod) -> Result<Vec<AppliedFee>> {
        Ok(Vec::new())
    }
}

/// One block to settle
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub settings: OwnerSettings,
    pub period: SettlementPeriod,
    pub aggregate: TransactionAggregate,
    /// Reserves due on or before this date are released into the block
    pub settlement_date: NaiveDate,
}

impl BlockRequest {
    pub fn owner(&self) -> Owner {
        self.settings.owner
    }

    pub fn currency(&self) -> Currency {
        self.aggregate.currency
    }
}

/// A computed block and everything needed to commit it
#[derive(Debug, Clone)]
pub struct PreparedBlock {
    pub block: SettlementBlock,
    /// Configured fees followed by custom fees
    pub applied_fees: Vec<AppliedFee>,
    /// Fees skipped because their configuration failed
    pub fee_failures: Vec<FeeError>,
    pub reserve: ReserveCreation,
    /// Pending entries the commit releases
    pub released_reserve_ids: Vec<ReserveEntryId>,
    pub chargebacks: ChargebackSettlementSummary,
}

/// What a commit changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub released_reserves: usize,
    pub settled_chargebacks: usize,
}

#[derive(Debug, Clone)]
pub struct SettledBlock {
    pub prepared: PreparedBlock,
    pub report: CommitReport,
}

pub struct SettlementService {
    fees: FeeEngine,
    custom_fees: Arc<dyn CustomFeeSource>,
    reserve: RollingReserveLedger,
    chargebacks: ChargebackTracker,
    config: SettlementConfig,
}

impl SettlementService {
    /// The chargeback tracker runs with `config.chargeback`
    pub fn new(
        fees: FeeEngine,
        custom_fees: Arc<dyn CustomFeeSource>,
        reserve: RollingReserveLedger,
        chargeback_store: Arc<dyn ChargebackStore>,
        notifier: Arc<dyn ChargebackNotifier>,
        config: SettlementConfig,
    ) -> Self {
        let chargebacks = ChargebackTracker::new(chargeback_store, notifier, config.chargeback);
        Self {
            fees,
            custom_fees,
            reserve,
            chargebacks,
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Tracker for feeding acquirer events
    pub fn chargebacks(&self) -> &ChargebackTracker {
        &self.chargebacks
    }

    /// Compute a block without releasing or settling anything.
    ///
    /// Any failure is reported as `GenerationFailed`, carrying the cause's
    /// code and retriability; the full cause is logged.
    pub async fn prepare_block(&self, request: &BlockRequest, now: DateTime<Utc>) -> Result<PreparedBlock> {
        self.try_prepare(request, now).await.map_err(|e| {
            error!(
                owner = %request.owner(),
                currency = %request.currency(),
                period = %request.period,
                code = e.error_code(),
                error = %e,
                "Settlement generation failed"
            );
            SettlementError::generation_failed(request.owner().to_string(), request.period.to_string(), &e)
        })
    }

    async fn try_prepare(&self, request: &BlockRequest, now: DateTime<Utc>) -> Result<PreparedBlock> {
        let owner = request.owner();
        let currency = request.currency();
        let aggregate = &request.aggregate;
        let exchange_rate = aggregate.required_exchange_rate()?;

        let ctx = FeeContext {
            settings: &request.settings,
            period: request.period,
            aggregate,
            now,
        };
        let (mut applied_fees, fee_failures) = partition_outcomes(self.fees.compute_fees(&ctx)?);
        if !fee_failures.is_empty() {
            warn!(%owner, period = %request.period, failed = fee_failures.len(), "Fees skipped");
        }
        applied_fees.extend(self.custom_fees.custom_fees(&owner, currency, &request.period).await?);

        let settings = self
            .reserve
            .get_merchant_reserve_settings(&owner)
            .await?
            .unwrap_or(self.config.reserve);
        let reserve = self
            .reserve
            .create_reserve_entry(
                CreateReserveRequest {
                    owner,
                    currency,
                    sales_amount: aggregate.total_sales_amount,
                    sales_amount_eur: aggregate.total_sales_eur,
                    exchange_rate,
                    period: request.period,
                    settings,
                },
                now,
            )
            .await?;

        let mut releasable = self
            .reserve
            .get_releaseable_funds(&owner, Some(currency), request.settlement_date)
            .await?;
        let released_reserve_ids: Vec<ReserveEntryId> = releasable.iter().map(|e| e.id).collect();
        releasable.extend(
            self.reserve
                .get_released_for_period(&owner, currency, &request.period)
                .await?,
        );
        releasable.sort_by_key(|e| e.id);

        let chargebacks = self
            .chargebacks
            .preview_settlements(&owner, Some(currency), request.settlement_date)
            .await?;

        let block = aggregate_block(&BlockInputs {
            owner,
            period: request.period,
            settlement_date: request.settlement_date,
            aggregate,
            applied_fees: &applied_fees,
            new_reserve_entry: reserve.entry(),
            releasable_reserves: &releasable,
        })?;

        info!(
            %owner,
            %currency,
            period = %request.period,
            gross = %block.gross_amount.original,
            gross_eur = %block.gross_amount.eur,
            fees = applied_fees.len(),
            released = releasable.len(),
            "Settlement block prepared"
        );

        Ok(PreparedBlock {
            block,
            applied_fees,
            fee_failures,
            reserve,
            released_reserve_ids,
            chargebacks,
        })
    }

    /// Settle the counted chargebacks, then release the counted reserves.
    ///
    /// Each step is atomic in its store. Chargebacks go first since they
    /// carry no block figure: if they fail nothing was released, and if the
    /// release fails a re-prepared block still pays the same reserves. A
    /// repeated commit fails with `Conflict` at the first step that has
    /// anything to mark.
    pub async fn commit_block(&self, prepared: &PreparedBlock, now: DateTime<Utc>) -> Result<CommitReport> {
        let settled_chargebacks = self.chargebacks.commit_settlement(&prepared.chargebacks).await?;
        let released_reserves = self
            .reserve
            .mark_reserve_as_released(&prepared.released_reserve_ids, &prepared.block.period, now)
            .await?;

        info!(
            owner = %prepared.block.owner,
            currency = %prepared.block.currency,
            period = %prepared.block.period,
            released_reserves,
            settled_chargebacks,
            "Settlement block committed"
        );

        Ok(CommitReport {
            released_reserves,
            settled_chargebacks,
        })
    }

    /// Prepare and commit in one call
    pub async fn settle_block(&self, request: &BlockRequest, now: DateTime<Utc>) -> Result<SettledBlock> {
        let prepared = self.prepare_block(request, now).await?;
        let report = self.commit_block(&prepared, now).await?;
        Ok(SettledBlock { prepared, report })
    }

    /// Decline chargebacks stuck in `PROCESSING` past the configured expiry
    /// window and retry failed notifications
    pub async fn expire_stale_chargebacks(&self, now: DateTime<Utc>) -> Result<Vec<ChargebackRecord>> {
        Ok(self.chargebacks.expire_stale(now).await?)
    }
}
