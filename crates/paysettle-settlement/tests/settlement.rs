use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use paysettle_chargeback::{InMemoryChargebackStore, RecordingNotifier};
use paysettle_fees::{FeeEngine, FeeRegistry, HistoryFrequencyGate};
use paysettle_reserve::{InMemoryReserveStore, ReserveCreation, RollingReserveLedger};
use paysettle_settlement::{BlockRequest, NoCustomFees, SettlementConfig, SettlementService};
use paysettle_types::{
    ChargebackEvent, ChargebackStatus, Currency, FeeConfiguration, FeeFrequency, MerchantId, Owner, OwnerSettings,
    ReserveStatus, SettlementError, SettlementPeriod, TransactionAggregate,
};

struct Harness {
    service: SettlementService,
    reserves: InMemoryReserveStore,
    gate: Arc<HistoryFrequencyGate>,
    owner: Owner,
}

fn harness(fees: Vec<FeeConfiguration>) -> Harness {
    let reserves = InMemoryReserveStore::new();
    let gate = Arc::new(HistoryFrequencyGate::new());
    let service = SettlementService::new(
        FeeEngine::new(Arc::new(FeeRegistry::from_configs(fees)), gate.clone()),
        Arc::new(NoCustomFees),
        RollingReserveLedger::new(Arc::new(reserves.clone())),
        Arc::new(InMemoryChargebackStore::new()),
        Arc::new(RecordingNotifier::new()),
        SettlementConfig::default(),
    );
    Harness {
        service,
        reserves,
        gate,
        owner: Owner::merchant(MerchantId::new()),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 6, 0, 0).unwrap()
}

fn month(y: i32, m: u32, last_day: u32) -> SettlementPeriod {
    SettlementPeriod::new(date(y, m, 1), date(y, m, last_day)).unwrap()
}

fn sales(currency: Currency, amount: Decimal, amount_eur: Decimal) -> TransactionAggregate {
    let mut agg = TransactionAggregate::empty(currency);
    agg.total_sales_amount = amount;
    agg.total_sales_eur = amount_eur;
    if !currency.is_eur() {
        agg.exchange_rate = Some(dec!(1.08));
    }
    agg
}

fn request(owner: Owner, period: SettlementPeriod, aggregate: TransactionAggregate) -> BlockRequest {
    BlockRequest {
        settings: OwnerSettings::new(owner),
        period,
        aggregate,
        settlement_date: period.end,
    }
}

#[tokio::test]
async fn reference_block_totals() {
    let h = harness(vec![FeeConfiguration::new("monthly_fee", 300_000, FeeFrequency::Monthly)]);
    let mut agg = sales(Currency::EUR, dec!(100000), dec!(100000));
    agg.total_refunds_amount = dec!(5000);
    agg.total_refunds_eur = dec!(5000);
    agg.chargeback_processing_amount = dec!(2000);
    agg.chargeback_processing_eur = dec!(2000);

    let prepared = h
        .service
        .prepare_block(&request(h.owner, month(2025, 1, 31), agg), now())
        .await
        .unwrap();

    let block = &prepared.block;
    assert_eq!(block.total_fees.original, dec!(3000));
    assert_eq!(block.generated_reserve.original, dec!(10000));
    assert_eq!(block.released_reserve.original, Decimal::ZERO);
    assert_eq!(block.gross_amount.original, dec!(80000));
    assert_eq!(block.gross_amount.eur, dec!(80000));
    assert_eq!(block.total_amount_paid, block.statement_total);
}

#[tokio::test]
async fn preparing_twice_is_idempotent() {
    let h = harness(vec![
        FeeConfiguration::new("processing_fee", 250, FeeFrequency::Transaction).percentage(),
        FeeConfiguration::new("monthly_fee", 1000, FeeFrequency::Monthly),
    ]);
    let req = request(h.owner, month(2025, 1, 31), sales(Currency::EUR, dec!(5000), dec!(5000)));

    let first = h.service.prepare_block(&req, now()).await.unwrap();
    h.gate.record(first.applied_fees.clone());
    let second = h.service.prepare_block(&req, now()).await.unwrap();

    assert_eq!(first.block, second.block);
    assert!(first.reserve.is_created());
    assert!(matches!(second.reserve, ReserveCreation::Existing(_)));
    assert_eq!(h.reserves.entry_count().await, 1);
}

#[tokio::test]
async fn one_time_fee_not_charged_in_later_period() {
    let h = harness(vec![FeeConfiguration::new("setup_fee", 5000, FeeFrequency::OneTime)]);

    let january = h
        .service
        .prepare_block(
            &request(h.owner, month(2025, 1, 31), sales(Currency::EUR, dec!(100), dec!(100))),
            now(),
        )
        .await
        .unwrap();
    assert_eq!(january.block.total_fees.eur, dec!(50));
    h.gate.record(january.applied_fees);

    let february = h
        .service
        .prepare_block(
            &request(h.owner, month(2025, 2, 28), sales(Currency::EUR, dec!(100), dec!(100))),
            now(),
        )
        .await
        .unwrap();
    assert!(february.applied_fees.is_empty());
}

#[tokio::test]
async fn reserve_released_after_holding_period() {
    let h = harness(Vec::new());

    let january = h
        .service
        .settle_block(
            &request(h.owner, month(2025, 1, 31), sales(Currency::EUR, dec!(1000), dec!(1000))),
            now(),
        )
        .await
        .unwrap();
    let entry = january.prepared.reserve.entry().cloned().unwrap();
    assert_eq!(entry.release_due_date, date(2025, 7, 31));

    // Due on the 31st, not yet releasable the day before
    let mut early = request(h.owner, month(2025, 7, 31), TransactionAggregate::empty(Currency::EUR));
    early.settlement_date = date(2025, 7, 30);
    let july = h.service.prepare_block(&early, now()).await.unwrap();
    assert!(july.released_reserve_ids.is_empty());

    let august_req = request(h.owner, month(2025, 8, 31), TransactionAggregate::empty(Currency::EUR));
    let august = h.service.prepare_block(&august_req, now()).await.unwrap();
    assert_eq!(august.released_reserve_ids, vec![entry.id]);
    assert_eq!(august.block.released_reserve.original, dec!(100));
    assert_eq!(august.block.gross_amount.original, dec!(100));

    let report = h.service.commit_block(&august, now()).await.unwrap();
    assert_eq!(report.released_reserves, 1);

    let stored = h.reserves.get(entry.id).await.unwrap();
    assert_eq!(stored.status, ReserveStatus::Released);
    assert!(stored.released_at.is_some());
    assert_eq!(stored.released_for, Some(month(2025, 8, 31)));

    // Re-running August reproduces its block without releasing again
    let again = h.service.prepare_block(&august_req, now()).await.unwrap();
    assert!(again.released_reserve_ids.is_empty());
    assert_eq!(again.block, august.block);

    // Later blocks never see it
    let september = h
        .service
        .prepare_block(
            &request(h.owner, month(2025, 9, 30), TransactionAggregate::empty(Currency::EUR)),
            now(),
        )
        .await
        .unwrap();
    assert_eq!(september.block.released_reserve.original, Decimal::ZERO);
}

#[tokio::test]
async fn settling_a_block_twice_gives_identical_blocks() {
    let h = harness(Vec::new());
    h.service
        .settle_block(
            &request(h.owner, month(2025, 1, 31), sales(Currency::EUR, dec!(1000), dec!(1000))),
            now(),
        )
        .await
        .unwrap();

    let august_req = request(h.owner, month(2025, 8, 31), sales(Currency::EUR, dec!(500), dec!(500)));
    let first = h.service.settle_block(&august_req, now()).await.unwrap();
    let second = h.service.settle_block(&august_req, now()).await.unwrap();

    assert_eq!(first.prepared.block.released_reserve.original, dec!(100));
    // 500 + 100 released - 50 withheld
    assert_eq!(first.prepared.block.gross_amount.original, dec!(550));
    assert_eq!(first.prepared.block, second.prepared.block);
    assert_eq!(first.report.released_reserves, 1);
    assert_eq!(second.report.released_reserves, 0);
}

#[tokio::test]
async fn failed_chargeback_step_leaves_reserves_unreleased() {
    let h = harness(Vec::new());
    let january = h
        .service
        .settle_block(
            &request(h.owner, month(2025, 1, 31), sales(Currency::EUR, dec!(1000), dec!(1000))),
            now(),
        )
        .await
        .unwrap();
    let entry_id = january.prepared.reserve.entry().unwrap().id;

    let event = |status| ChargebackEvent {
        transaction_id: "tx_declined".to_string(),
        owner: h.owner,
        amount: 1000,
        currency: Currency::EUR,
        amount_eur: 1000,
        exchange_rate: Decimal::ONE,
        status,
        occurred_at: now(),
    };
    let tracker = h.service.chargebacks();
    tracker.process_event(event(ChargebackStatus::Processing)).await.unwrap();
    tracker.process_event(event(ChargebackStatus::Declined)).await.unwrap();

    let august_req = request(h.owner, month(2025, 8, 31), TransactionAggregate::empty(Currency::EUR));
    let august = h.service.prepare_block(&august_req, now()).await.unwrap();
    assert_eq!(august.chargebacks.declined_ids, vec!["tx_declined".to_string()]);

    // Settled by another run between prepare and commit
    tracker
        .process_settlements_chargeback(&h.owner, Some(Currency::EUR), date(2025, 8, 31))
        .await
        .unwrap();

    let commit = h.service.commit_block(&august, now()).await;
    assert!(matches!(commit, Err(SettlementError::Conflict { .. })));
    assert_eq!(h.reserves.get(entry_id).await.unwrap().status, ReserveStatus::Pending);

    let retry = h.service.prepare_block(&august_req, now()).await.unwrap();
    assert_eq!(retry.block, august.block);
    assert_eq!(retry.released_reserve_ids, vec![entry_id]);
    let report = h.service.commit_block(&retry, now()).await.unwrap();
    assert_eq!(report.released_reserves, 1);
    assert_eq!(report.settled_chargebacks, 0);
}

#[tokio::test]
async fn second_commit_is_a_conflict() {
    let h = harness(Vec::new());
    h.service
        .settle_block(
            &request(h.owner, month(2025, 1, 31), sales(Currency::EUR, dec!(1000), dec!(1000))),
            now(),
        )
        .await
        .unwrap();

    let august = h
        .service
        .prepare_block(
            &request(h.owner, month(2025, 8, 31), TransactionAggregate::empty(Currency::EUR)),
            now(),
        )
        .await
        .unwrap();
    h.service.commit_block(&august, now()).await.unwrap();

    let second = h.service.commit_block(&august, now()).await;
    assert!(matches!(second, Err(SettlementError::Conflict { .. })));
}

#[tokio::test]
async fn released_reserve_stays_in_its_currency() {
    let h = harness(Vec::new());
    h.service
        .settle_block(
            &request(h.owner, month(2025, 1, 31), sales(Currency::USD, dec!(1080), dec!(1000))),
            now(),
        )
        .await
        .unwrap();

    let eur = h
        .service
        .prepare_block(
            &request(h.owner, month(2025, 8, 31), TransactionAggregate::empty(Currency::EUR)),
            now(),
        )
        .await
        .unwrap();
    assert!(eur.released_reserve_ids.is_empty());
    assert_eq!(eur.block.released_reserve.original, Decimal::ZERO);

    let mut usd_agg = TransactionAggregate::empty(Currency::USD);
    usd_agg.exchange_rate = Some(dec!(1.08));
    let usd = h
        .service
        .prepare_block(&request(h.owner, month(2025, 8, 31), usd_agg), now())
        .await
        .unwrap();
    assert_eq!(usd.block.released_reserve.original, dec!(108));
    assert_eq!(usd.block.released_reserve.eur, dec!(100));
}

#[tokio::test]
async fn chargebacks_partitioned_into_block() {
    let h = harness(Vec::new());
    let opened = now() - Duration::days(3);
    let event = |id: &str, status| ChargebackEvent {
        transaction_id: id.to_string(),
        owner: h.owner,
        amount: 2500,
        currency: Currency::EUR,
        amount_eur: 2500,
        exchange_rate: Decimal::ONE,
        status,
        occurred_at: opened,
    };

    for id in ["tx_approved", "tx_declined", "tx_processing"] {
        h.service.chargebacks().process_event(event(id, ChargebackStatus::Processing)).await.unwrap();
    }
    h.service
            .chargebacks()
        .process_event(event("tx_approved", ChargebackStatus::Approved))
        .await
        .unwrap();
    h.service
            .chargebacks()
        .process_event(event("tx_declined", ChargebackStatus::Declined))
        .await
        .unwrap();

    let req = request(h.owner, month(2025, 1, 31), sales(Currency::EUR, dec!(1000), dec!(1000)));
    let settled = h.service.settle_block(&req, now()).await.unwrap();

    let summary = &settled.prepared.chargebacks;
    assert_eq!(summary.processed_count, 2);
    assert_eq!(summary.approved_refunds, dec!(25));
    assert_eq!(summary.pending_ids, vec!["tx_processing".to_string()]);
    assert_eq!(settled.report.settled_chargebacks, 2);

    let next = h.service.prepare_block(&req, now()).await.unwrap();
    assert_eq!(next.chargebacks.processed_count, 0);
    assert_eq!(next.chargebacks.pending_ids, vec!["tx_processing".to_string()]);
}

#[tokio::test]
async fn stale_chargebacks_expire_through_service() {
    let h = harness(Vec::new());
    let opened = now() - Duration::days(20);
    h.service
            .chargebacks()
        .process_event(ChargebackEvent {
            transaction_id: "tx_stale".to_string(),
            owner: h.owner,
            amount: 1000,
            currency: Currency::EUR,
            amount_eur: 1000,
            exchange_rate: Decimal::ONE,
            status: ChargebackStatus::Processing,
            occurred_at: opened,
        })
        .await
        .unwrap();

    let expired = h.service.expire_stale_chargebacks(now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].status, ChargebackStatus::Declined);
}
