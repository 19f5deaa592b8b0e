//! Alert reconciliation
//!
//! Brings a part's alert record in line with its current stock status.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Alert, NewAlert, Part, StockStatus};
use crate::repository::{AlertRepository, PartRepository};

/// What reconciliation should do for a part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Nothing to do
    Noop,
    /// Raise a new alert
    Create,
    /// Update the snapshot on the open alert
    Refresh,
    /// Close the open alert
    Resolve,
}

/// Decide the next action from a status and the part's open alert
pub fn plan(status: StockStatus, existing: Option<&Alert>) -> ReconcileAction {
    match (status.needs_alert(), existing.is_some()) {
        (false, true) => ReconcileAction::Resolve,
        (false, false) => ReconcileAction::Noop,
        (true, true) => ReconcileAction::Refresh,
        (true, false) => ReconcileAction::Create,
    }
}

/// Result of reconciling one part
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// A new alert was raised
    Created(Alert),
    /// The open alert's snapshot was rewritten
    Refreshed(Alert),
    /// The open alert already matched the part
    Unchanged(Alert),
    /// The open alert was closed
    Resolved(Alert),
    /// Part is in stock and had no open alert
    Noop,
}

impl Reconciliation {
    /// The action that was taken
    pub fn action(&self) -> ReconcileAction {
        match self {
            Self::Created(_) => ReconcileAction::Create,
            Self::Refreshed(_) | Self::Unchanged(_) => ReconcileAction::Refresh,
            Self::Resolved(_) => ReconcileAction::Resolve,
            Self::Noop => ReconcileAction::Noop,
        }
    }

    /// The alert that was touched, if any
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            Self::Created(a) | Self::Refreshed(a) | Self::Unchanged(a) | Self::Resolved(a) => Some(a),
            Self::Noop => None,
        }
    }

    /// Consume into the touched alert
    pub fn into_alert(self) -> Option<Alert> {
        match self {
            Self::Created(a) | Self::Refreshed(a) | Self::Unchanged(a) | Self::Resolved(a) => Some(a),
            Self::Noop => None,
        }
    }
}

/// Applies reconciliation decisions through an alert repository.
///
/// Each reconciliation runs inside an [`AlertScope`], so the part is read
/// and its alert written while the part stays locked.
#[derive(Clone)]
pub struct Reconciler {
    parts: Arc<dyn PartRepository>,
    alerts: Arc<dyn AlertRepository>,
}

impl Reconciler {
    /// Create a reconciler over the part and alert repositories
    pub fn new(parts: Arc<dyn PartRepository>, alerts: Arc<dyn AlertRepository>) -> Self {
        Self { parts, alerts }
    }

    /// Reconcile the alert state for a part against its live row.
    ///
    /// Returns the part as read under the lock together with the outcome.
    pub async fn apply(&self, part_id: Uuid) -> Result<(Part, Reconciliation)> {
        match self.apply_once(part_id).await {
            Err(Error::Conflict(reason)) => {
                // A writer outside the lock raised the alert first; adopt it.
                warn!(part_id = %part_id, %reason, "Unresolved alert already exists, reconciling again");
                self.apply_once(part_id).await
            }
            other => other,
        }
    }

    async fn apply_once(&self, part_id: Uuid) -> Result<(Part, Reconciliation)> {
        let mut scope = self.alerts.begin(part_id, self.parts.as_ref()).await?;
        let part = scope.part().clone();
        let existing = scope.find_unresolved().await?;
        let action = plan(part.stock_status(), existing.as_ref());

        debug!(
            part_id = %part.id,
            quantity = part.quantity_in_stock,
            minimum = part.minimum_stock_level,
            action = ?action,
            "Reconciling part"
        );

        let outcome = match (action, existing) {
            (ReconcileAction::Create, _) => {
                Reconciliation::Created(scope.create(NewAlert::for_part(&part)).await?)
            }
            (ReconcileAction::Refresh, Some(mut alert)) => {
                if alert.refresh(&part, Utc::now()) {
                    Reconciliation::Refreshed(scope.update(&alert).await?)
                } else {
                    Reconciliation::Unchanged(alert)
                }
            }
            (ReconcileAction::Resolve, Some(mut alert)) => {
                alert.resolve(Utc::now());
                Reconciliation::Resolved(scope.update(&alert).await?)
            }
            _ => Reconciliation::Noop,
        };

        scope.commit().await?;
        record(&part, &outcome);
        Ok((part, outcome))
    }
}

fn record(part: &Part, outcome: &Reconciliation) {
    match outcome {
        Reconciliation::Created(alert) => {
            info!(
                part_id = %part.id,
                alert_id = %alert.id,
                status = %part.stock_status(),
                "Part '{}' is low on stock, alert created",
                part.name
            );
            metrics::counter!("labstock_alerts_created_total").increment(1);
        }
        Reconciliation::Refreshed(alert) => {
            debug!(
                part_id = %part.id,
                alert_id = %alert.id,
                current_stock = alert.current_stock,
                "Alert snapshot refreshed"
            );
        }
        Reconciliation::Resolved(alert) => {
            info!(part_id = %part.id, alert_id = %alert.id, "Stock replenished, alert resolved");
            metrics::counter!("labstock_alerts_resolved_total").increment(1);
        }
        Reconciliation::Unchanged(_) | Reconciliation::Noop => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryAlertRepository, InMemoryPartRepository};
    use crate::models::NewPart;
    use crate::repository::PartRepository;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn open_alert() -> Alert {
        let part = NewPart::new("P", "Part", 1, 5).into_part(Uuid::new_v4(), Utc::now());
        NewAlert::for_part(&part).into_alert(Uuid::new_v4(), Utc::now())
    }

    #[rstest]
    #[case(StockStatus::InStock, true, ReconcileAction::Resolve)]
    #[case(StockStatus::InStock, false, ReconcileAction::Noop)]
    #[case(StockStatus::LowStock, true, ReconcileAction::Refresh)]
    #[case(StockStatus::OutOfStock, true, ReconcileAction::Refresh)]
    #[case(StockStatus::LowStock, false, ReconcileAction::Create)]
    #[case(StockStatus::OutOfStock, false, ReconcileAction::Create)]
    fn test_plan_table(#[case] status: StockStatus, #[case] has_alert: bool, #[case] expected: ReconcileAction) {
        let alert = open_alert();
        let existing = has_alert.then_some(&alert);
        assert_eq!(plan(status, existing), expected);
    }

    async fn setup(quantity: i32, minimum: i32) -> (Arc<InMemoryPartRepository>, Arc<InMemoryAlertRepository>, Reconciler, Part) {
        let parts = Arc::new(InMemoryPartRepository::new());
        let alerts = Arc::new(InMemoryAlertRepository::new());
        let reconciler = Reconciler::new(parts.clone(), alerts.clone());
        let part = parts
            .create(NewPart::new("TP-7", "Turbo pump bearing", quantity, minimum))
            .await
            .unwrap();
        (parts, alerts, reconciler, part)
    }

    #[tokio::test]
    async fn test_low_part_gets_alert() {
        let (_, alerts, reconciler, part) = setup(5, 10).await;

        let (_, outcome) = reconciler.apply(part.id).await.unwrap();

        let Reconciliation::Created(alert) = outcome else {
            panic!("expected a created alert, got {outcome:?}");
        };
        assert_eq!(alert.current_stock, 5);
        assert_eq!(alert.threshold_stock, 10);
        assert!(!alert.is_resolved);
        assert_eq!(alerts.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_second_apply_is_idempotent() {
        let (_, alerts, reconciler, part) = setup(5, 10).await;

        let first = reconciler.apply(part.id).await.unwrap().1.into_alert().unwrap();
        let (_, second) = reconciler.apply(part.id).await.unwrap();

        assert_eq!(second, Reconciliation::Unchanged(first));
        assert_eq!(alerts.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_replenished_part_resolves_alert() {
        let (parts, _, reconciler, part) = setup(5, 10).await;
        reconciler.apply(part.id).await.unwrap();

        parts.adjust_stock(part.id, 10).await.unwrap();
        let (live, outcome) = reconciler.apply(part.id).await.unwrap();
        assert_eq!(live.quantity_in_stock, 15);

        let Reconciliation::Resolved(alert) = outcome else {
            panic!("expected a resolved alert, got {outcome:?}");
        };
        assert!(alert.is_resolved);
        assert!(alert.resolved_at.is_some());

        // nothing left to resolve
        assert_eq!(reconciler.apply(part.id).await.unwrap().1, Reconciliation::Noop);
    }

    #[tokio::test]
    async fn test_dropping_further_refreshes_snapshot() {
        let (parts, alerts, reconciler, part) = setup(5, 10).await;
        reconciler.apply(part.id).await.unwrap();

        parts.adjust_stock(part.id, -5).await.unwrap();
        let (_, outcome) = reconciler.apply(part.id).await.unwrap();

        assert_eq!(outcome.action(), ReconcileAction::Refresh);
        let alert = outcome.into_alert().unwrap();
        assert_eq!(alert.current_stock, 0);
        assert!(alert.message.starts_with("OUT OF STOCK ALERT!"));
        assert_eq!(alerts.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_decision_uses_live_row() {
        let (parts, alerts, reconciler, part) = setup(5, 10).await;
        reconciler.apply(part.id).await.unwrap();

        // Written behind the reconciler's back
        parts.set_quantity(part.id, 30).unwrap();

        let (live, outcome) = reconciler.apply(part.id).await.unwrap();
        assert_eq!(live.quantity_in_stock, 30);
        assert_eq!(outcome.action(), ReconcileAction::Resolve);
        assert!(alerts.snapshot().iter().all(|a| a.is_resolved));
    }

    #[tokio::test]
    async fn test_in_stock_part_without_alert_is_noop() {
        let (_, alerts, reconciler, part) = setup(50, 10).await;
        assert_eq!(reconciler.apply(part.id).await.unwrap().1, Reconciliation::Noop);
        assert!(alerts.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_part_is_not_found() {
        let (_, alerts, reconciler, _) = setup(5, 10).await;
        let err = reconciler.apply(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(alerts.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_repository_failure_is_surfaced() {
        let (_, alerts, reconciler, part) = setup(5, 10).await;
        alerts.set_unavailable(true);

        let err = reconciler.apply(part.id).await.unwrap_err();
        assert!(err.is_retryable());

        alerts.set_unavailable(false);
        assert!(alerts.snapshot().is_empty());
    }
}
