//! Alert evaluation service

use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Alert, AlertSummary, Part, PartView, StockStatus};
use crate::repository::{AlertRepository, PartRepository};

use super::notifier::NotificationSender;
use super::reconciler::{ReconcileAction, Reconciler, Reconciliation};
use super::summary;
use super::sweep::{SweepLatch, SweepOutcome, SweepReport, SweepState};

/// Outcome of a stock adjustment and the reconciliation it triggered
#[derive(Debug, Clone, Serialize)]
pub struct StockAdjustment {
    /// The part after the adjustment
    pub part: PartView,
    /// What reconciliation did, when it ran
    pub action: Option<ReconcileAction>,
    /// The alert that was created, refreshed or resolved
    pub alert: Option<Alert>,
    /// Why alert state could not be brought up to date
    pub alert_error: Option<String>,
}

impl StockAdjustment {
    /// True when the stock changed but the alert state may lag behind
    pub fn alert_state_stale(&self) -> bool {
        self.alert_error.is_some()
    }
}

/// Evaluates stock levels against thresholds and keeps alerts in sync.
///
/// Work on a single part is serialized through a per-part lock; different
/// parts proceed independently.
pub struct AlertEvaluator {
    parts: Arc<dyn PartRepository>,
    alerts: Arc<dyn AlertRepository>,
    reconciler: Reconciler,
    notifier: Option<Arc<NotificationSender>>,
    part_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    sweep: SweepLatch,
    sweep_concurrency: usize,
    notify_sweep_summary: bool,
}

impl AlertEvaluator {
    /// Create a new alert evaluator
    pub fn new(parts: Arc<dyn PartRepository>, alerts: Arc<dyn AlertRepository>) -> Self {
        Self {
            reconciler: Reconciler::new(parts.clone(), alerts.clone()),
            parts,
            alerts,
            notifier: None,
            part_locks: DashMap::new(),
            sweep: SweepLatch::default(),
            sweep_concurrency: 4,
            notify_sweep_summary: false,
        }
    }

    /// Send notifications through `notifier`
    pub fn with_notifier(mut self, notifier: Arc<NotificationSender>, sweep_summary: bool) -> Self {
        self.notifier = Some(notifier).filter(|n| n.is_enabled());
        self.notify_sweep_summary = sweep_summary;
        self
    }

    /// Number of parts reconciled in parallel during a sweep
    pub fn with_sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep_concurrency = concurrency.max(1);
        self
    }

    /// Part repository in use
    pub fn parts(&self) -> &Arc<dyn PartRepository> {
        &self.parts
    }

    /// Alert repository in use
    pub fn alerts(&self) -> &Arc<dyn AlertRepository> {
        &self.alerts
    }

    async fn lock_part(&self, id: Uuid) -> PartGuard<'_> {
        let lock = self.part_locks.entry(id).or_default().clone();
        PartGuard {
            locks: &self.part_locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Stock status of a part
    pub fn classify(&self, part: &Part) -> StockStatus {
        part.stock_status()
    }

    /// Reconcile alert state for `part`.
    ///
    /// Only the part's id is taken from the argument; the decision is made
    /// from the part as it stands once locked, so a stale copy never
    /// resolves the alert of a part that is still low.
    pub async fn reconcile(&self, part: &Part) -> Result<Option<Alert>> {
        Ok(self.reconcile_part(part.id).await?.into_alert())
    }

    /// Re-read a part and reconcile its alert state
    pub async fn reconcile_part(&self, id: Uuid) -> Result<Reconciliation> {
        let _guard = self.lock_part(id).await;
        let (part, outcome) = self.reconciler.apply(id).await?;
        self.notify_created(&part, &outcome);
        Ok(outcome)
    }

    /// Adjust a part's stock and reconcile its alert.
    ///
    /// Rejected adjustments (`InvalidAdjustment`, `NotFound`) are returned as
    /// errors before any alert is touched. Once the stock write succeeds it
    /// is never rolled back; a reconciliation failure is reported in the
    /// result instead.
    pub async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<StockAdjustment> {
        let _guard = self.lock_part(id).await;

        let part = self.parts.adjust_stock(id, delta).await?;
        metrics::counter!("labstock_stock_adjustments_total").increment(1);
        info!(
            part_id = %id,
            part_number = %part.part_number,
            delta,
            "Stock updated: {} -> {}",
            part.quantity_in_stock - delta,
            part.quantity_in_stock
        );

        match self.reconciler.apply(id).await {
            Ok((live, outcome)) => {
                self.notify_created(&live, &outcome);
                Ok(StockAdjustment {
                    action: Some(outcome.action()),
                    alert: outcome.into_alert(),
                    part: part.into(),
                    alert_error: None,
                })
            }
            Err(e) => {
                warn!(part_id = %id, error = %e, "Alert reconciliation skipped, alert state may be stale");
                Ok(StockAdjustment {
                    action: None,
                    alert: None,
                    part: part.into(),
                    alert_error: Some(e.to_string()),
                })
            }
        }
    }

    /// Summary statistics from live part data and alert counts
    pub async fn summarize(&self) -> Result<AlertSummary> {
        summary::summarize(self.parts.as_ref(), self.alerts.as_ref()).await
    }

    /// Every active part currently low or out of stock
    pub async fn low_stock_parts(&self) -> Result<Vec<Part>> {
        summary::low_stock_parts(self.parts.as_ref()).await
    }

    /// Alerts, newest first
    pub async fn list_alerts(&self, active_only: bool) -> Result<Vec<Alert>> {
        self.alerts.list_all(active_only).await
    }

    /// Whether a sweep is in progress
    pub fn sweep_state(&self) -> SweepState {
        self.sweep.state()
    }

    /// Run one full sweep
    pub async fn run_sweep(&self) -> Result<SweepOutcome> {
        self.run_sweep_until(&CancellationToken::new()).await
    }

    /// Run one full sweep, stopping between parts once `cancel` fires.
    ///
    /// Reconciliations already in flight always finish.
    pub async fn run_sweep_until(&self, cancel: &CancellationToken) -> Result<SweepOutcome> {
        let Some(_running) = self.sweep.try_enter() else {
            info!("Alert sweep already running, trigger dropped");
            metrics::counter!("labstock_sweeps_skipped_total").increment(1);
            return Ok(SweepOutcome::Skipped);
        };

        info!("Running alert sweep");
        let parts = self.parts.list().await?;

        let results: Vec<(Uuid, Result<(Part, Reconciliation)>)> = stream::iter(parts)
            .take_until(cancel.cancelled())
            .map(|part| async move { (part.id, self.sweep_one(part.id).await) })
            .buffer_unordered(self.sweep_concurrency)
            .collect()
            .await;

        let mut report = SweepReport {
            cancelled: cancel.is_cancelled(),
            ..Default::default()
        };
        let mut low = Vec::new();

        for (id, result) in results {
            report.parts_checked += 1;
            match result {
                Ok((part, outcome)) => {
                    match outcome {
                        Reconciliation::Created(_) => report.created += 1,
                        Reconciliation::Refreshed(_) => report.refreshed += 1,
                        Reconciliation::Resolved(_) => report.resolved += 1,
                        Reconciliation::Unchanged(_) | Reconciliation::Noop => {}
                    }
                    if part.is_low_stock() {
                        low.push(part);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(part_id = %id, error = %e, "Sweep could not reconcile part");
                }
            }
        }
        report.low_stock_parts = low.len();

        metrics::counter!("labstock_sweeps_total").increment(1);
        info!(
            parts = report.parts_checked,
            created = report.created,
            refreshed = report.refreshed,
            resolved = report.resolved,
            failed = report.failed,
            low = report.low_stock_parts,
            cancelled = report.cancelled,
            "Alert sweep finished"
        );

        if self.notify_sweep_summary && !report.cancelled {
            if let Some(notifier) = &self.notifier {
                low.sort_by(|a, b| a.name.cmp(&b.name));
                notifier.send_summary(&low).await;
            }
        }

        Ok(SweepOutcome::Completed(report))
    }

    async fn sweep_one(&self, id: Uuid) -> Result<(Part, Reconciliation)> {
        let _guard = self.lock_part(id).await;
        let (part, outcome) = self.reconciler.apply(id).await?;
        self.notify_created(&part, &outcome);
        debug!(part_id = %id, action = ?outcome.action(), "Swept part");
        Ok((part, outcome))
    }

    fn notify_created(&self, part: &Part, outcome: &Reconciliation) {
        let (Some(notifier), Reconciliation::Created(alert)) = (&self.notifier, outcome) else {
            return;
        };

        let notifier = notifier.clone();
        let part = part.clone();
        let alert = alert.clone();
        tokio::spawn(async move {
            notifier.send_low_stock(&part, &alert).await;
        });
    }
}

/// Holds a part's lock and drops its registry entry once nobody else
/// holds or waits on it.
struct PartGuard<'a> {
    locks: &'a DashMap<Uuid, Arc<Mutex<()>>>,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PartGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters clone the Arc under the same shard lock, so a count of one
        // means the entry is unused.
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
