//! End-to-end alert lifecycle against the in-memory stores

use std::sync::Arc;

use labstock::alerting::{AlertEvaluator, SweepOutcome};
use labstock::db::{InMemoryAlertRepository, InMemoryPartRepository};
use labstock::models::{AlertSummary, NewPart, Part, StockStatus};
use labstock::repository::PartRepository;
use labstock::Error;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

struct Fixture {
    parts: Arc<InMemoryPartRepository>,
    alerts: Arc<InMemoryAlertRepository>,
    evaluator: AlertEvaluator,
}

fn fixture() -> Fixture {
    let parts = Arc::new(InMemoryPartRepository::new());
    let alerts = Arc::new(InMemoryAlertRepository::new());
    let evaluator = AlertEvaluator::new(parts.clone(), alerts.clone());
    Fixture {
        parts,
        alerts,
        evaluator,
    }
}

async fn add_part(fx: &Fixture, number: &str, quantity: i32, minimum: i32) -> Part {
    fx.parts
        .create(NewPart::new(number, format!("Part {number}"), quantity, minimum))
        .await
        .unwrap()
}

#[tokio::test]
async fn low_part_gets_an_alert_with_snapshot() {
    let fx = fixture();
    let part = add_part(&fx, "FLT-100", 5, 10).await;

    assert_eq!(fx.evaluator.classify(&part), StockStatus::LowStock);

    let alert = fx.evaluator.reconcile(&part).await.unwrap().unwrap();
    assert_eq!(alert.part_id, part.id);
    assert_eq!(alert.current_stock, 5);
    assert_eq!(alert.threshold_stock, 10);
    assert!(!alert.is_resolved);
    assert!(alert.resolved_at.is_none());
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let fx = fixture();
    let part = add_part(&fx, "FLT-101", 0, 4).await;

    let first = fx.evaluator.reconcile(&part).await.unwrap().unwrap();
    let second = fx.evaluator.reconcile(&part).await.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first, second);
    assert_eq!(fx.alerts.snapshot().len(), 1);
}

#[tokio::test]
async fn restock_resolves_the_open_alert() {
    let fx = fixture();
    let part = add_part(&fx, "FLT-102", 5, 10).await;
    fx.evaluator.reconcile(&part).await.unwrap();

    let result = fx.evaluator.adjust_stock(part.id, 10).await.unwrap();
    assert_eq!(result.part.part.quantity_in_stock, 15);

    let alert = result.alert.unwrap();
    assert!(alert.is_resolved);
    assert!(alert.resolved_at.is_some());

    // Nothing left to resolve
    let part = fx.parts.get(part.id).await.unwrap();
    assert!(fx.evaluator.reconcile(&part).await.unwrap().is_none());
    assert_eq!(fx.alerts.snapshot().len(), 1);
}

#[tokio::test]
async fn overdraw_is_rejected_without_touching_alerts() {
    let fx = fixture();
    let part = add_part(&fx, "FLT-103", 5, 10).await;

    let err = fx.evaluator.adjust_stock(part.id, -20).await.unwrap_err();
    assert!(matches!(err, Error::InvalidAdjustment { .. }));

    assert_eq!(fx.parts.get(part.id).await.unwrap().quantity_in_stock, 5);
    assert!(fx.alerts.snapshot().is_empty());
}

#[tokio::test]
async fn empty_inventory_summarizes_to_zero() {
    let fx = fixture();
    let summary = fx.evaluator.summarize().await.unwrap();
    assert_eq!(summary, AlertSummary::default());
}

#[tokio::test]
async fn summary_uses_live_part_data() {
    let fx = fixture();
    let mut critical = NewPart::new("VLV-1", "Critical valve", 1, 5);
    critical.is_critical = true;
    let critical = fx.parts.create(critical).await.unwrap();
    add_part(&fx, "VLV-2", 0, 5).await;
    add_part(&fx, "VLV-3", 50, 5).await;

    fx.evaluator.run_sweep().await.unwrap();

    // Restocked outside the API; no reconcile has run yet
    fx.parts.set_quantity(critical.id, 40).unwrap();

    let summary = fx.evaluator.summarize().await.unwrap();
    assert_eq!(summary.total_alerts, 2);
    assert_eq!(summary.active_alerts, 2);
    // Only VLV-2 is still below its minimum
    assert_eq!(summary.critical_parts_low, 1);
    assert_eq!(summary.out_of_stock_parts, 1);
}

#[tokio::test]
async fn sweep_reports_and_heals() {
    let fx = fixture();
    let low = add_part(&fx, "TUB-1", 2, 3).await;
    add_part(&fx, "TUB-2", 30, 3).await;

    let SweepOutcome::Completed(report) = fx.evaluator.run_sweep().await.unwrap() else {
        panic!("sweep should not be skipped");
    };
    assert_eq!(report.parts_checked, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.low_stock_parts, 1);

    fx.parts.set_quantity(low.id, 10).unwrap();
    let SweepOutcome::Completed(report) = fx.evaluator.run_sweep().await.unwrap() else {
        panic!("sweep should not be skipped");
    };
    assert_eq!(report.resolved, 1);
    assert_eq!(fx.evaluator.list_alerts(true).await.unwrap().len(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_adjustments_keep_one_open_alert(
        start in 0i32..30,
        minimum in 0i32..15,
        deltas in proptest::collection::vec(-20i32..20, 1..25),
    ) {
        tokio_test::block_on(async {
            let fx = fixture();
            let part = add_part(&fx, "RND-1", start, minimum).await;
            let mut expected = start;

            for delta in deltas {
                match fx.evaluator.adjust_stock(part.id, delta).await {
                    Ok(result) => {
                        expected += delta;
                        assert_eq!(result.part.part.quantity_in_stock, expected);
                    }
                    Err(Error::InvalidAdjustment { .. }) => assert!(expected + delta < 0),
                    Err(e) => panic!("unexpected error: {e}"),
                }

                let alerts = fx.alerts.snapshot();
                let open = alerts.iter().filter(|a| !a.is_resolved).count();
                let status = StockStatus::classify(expected, minimum);
                assert!(open <= 1);
                assert_eq!(open == 1, status.needs_alert());
                assert!(alerts.iter().all(|a| a.is_resolved == a.resolved_at.is_some()));
            }
        });
    }
}
