//! Fee engine
//!
//! Produces the applied fees of one owner for one period. A failure in one
//! fee configuration is reported as that fee's outcome and never stops the
//! remaining fees from being evaluated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use paysettle_types::{
    AppliedFee, FeeConfiguration, FeeOrigin, OwnerSettings, SettlementPeriod, TransactionAggregate,
};

use crate::condition;
use crate::{FeeError, FeeRegistry, FeeResult, FeeStrategyKind, FrequencyGate};

/// Outcome of evaluating one configured fee
pub type FeeOutcome = FeeResult<AppliedFee>;

/// Everything the engine needs for one owner, period and currency
#[derive(Debug, Clone, Copy)]
pub struct FeeContext<'a> {
    pub settings: &'a OwnerSettings,
    pub period: SettlementPeriod,
    pub aggregate: &'a TransactionAggregate,
    pub now: DateTime<Utc>,
}

pub struct FeeEngine {
    registry: Arc<FeeRegistry>,
    gate: Arc<dyn FrequencyGate>,
}

impl FeeEngine {
    pub fn new(registry: Arc<FeeRegistry>, gate: Arc<dyn FrequencyGate>) -> Self {
        Self { registry, gate }
    }

    pub fn registry(&self) -> &FeeRegistry {
        &self.registry
    }

    /// Evaluate every registered fee for the context.
    ///
    /// A non-EUR aggregate without an exchange rate fails the whole call
    /// before any fee is evaluated.
    pub fn compute_fees(&self, ctx: &FeeContext<'_>) -> paysettle_types::Result<Vec<FeeOutcome>> {
        let rate = ctx.aggregate.required_exchange_rate()?;
        let mut outcomes = Vec::new();

        for config in self.registry.all() {
            match self.evaluate_fee(&config, ctx, rate) {
                Ok(Some(applied)) => outcomes.push(Ok(applied)),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        owner = %ctx.settings.owner,
                        period = %ctx.period,
                        fee_key = %config.key,
                        error = %e,
                        "Skipping fee after evaluation error"
                    );
                    outcomes.push(Err(e));
                }
            }
        }

        Ok(outcomes)
    }

    /// Evaluate a single configuration. `Ok(None)` means the fee does not
    /// apply this run.
    pub fn evaluate_fee(
        &self,
        config: &FeeConfiguration,
        ctx: &FeeContext<'_>,
        rate: Decimal,
    ) -> FeeResult<Option<AppliedFee>> {
        if let Some(cond) = &config.condition {
            let applicable = condition::evaluate(cond, ctx.settings).map_err(|reason| FeeError::MalformedCondition {
                fee_key: config.key.clone(),
                reason,
            })?;
            if !applicable {
                debug!(fee_key = %config.key, owner = %ctx.settings.owner, "Fee condition not met");
                return Ok(None);
            }
        }

        let owner = &ctx.settings.owner;
        if !self.gate.should_apply_fee(config.frequency, owner, &config.key, &ctx.period)? {
            debug!(fee_key = %config.key, %owner, frequency = %config.frequency, "Fee window already satisfied");
            return Ok(None);
        }

        let strategy = FeeStrategyKind::for_config(config);
        let overflow = || FeeError::Overflow {
            fee_key: config.key.clone(),
        };
        let amount_eur = strategy.calculate(ctx.aggregate, config.amount).ok_or_else(overflow)?;
        let amount = strategy
            .calculate_original(ctx.aggregate, config.amount, rate)
            .ok_or_else(overflow)?;

        Ok(Some(AppliedFee {
            fee_key: config.key.clone(),
            name: config.name.clone(),
            owner: *owner,
            period: ctx.period,
            currency: ctx.aggregate.currency,
            amount,
            amount_eur,
            frequency: config.frequency,
            origin: FeeOrigin::Configured,
            applied_at: ctx.now,
        }))
    }
}

/// Split outcomes into applied fees and per-fee failures
pub fn partition_outcomes(outcomes: Vec<FeeOutcome>) -> (Vec<AppliedFee>, Vec<FeeError>) {
    let mut applied = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(fee) => applied.push(fee),
            Err(e) => failures.push(e),
        }
    }
    (applied, failures)
}
