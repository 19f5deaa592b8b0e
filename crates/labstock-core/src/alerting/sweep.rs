//! Periodic sweep over all parts
//!
//! The sweep is a safety net for alert state that drifted because a write
//! bypassed the stock-adjustment path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::evaluator::AlertEvaluator;

/// Whether a sweep is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepState {
    /// No sweep running; the next trigger starts one
    Idle,
    /// A sweep is running; triggers are dropped
    Running,
}

/// `Idle -> Running -> Idle` latch; a second entry while running is refused
#[derive(Debug, Default)]
pub struct SweepLatch {
    running: AtomicBool,
}

impl SweepLatch {
    /// Current state
    pub fn state(&self) -> SweepState {
        if self.running.load(Ordering::Acquire) {
            SweepState::Running
        } else {
            SweepState::Idle
        }
    }

    /// Move to `Running`, or `None` if a sweep already holds the latch
    pub fn try_enter(&self) -> Option<SweepGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard { latch: self })
    }
}

/// Returns the latch to `Idle` when dropped, including on cancellation
#[derive(Debug)]
pub struct SweepGuard<'a> {
    latch: &'a SweepLatch,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.latch.running.store(false, Ordering::Release);
    }
}

/// Counters from one completed sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Parts examined
    pub parts_checked: usize,
    /// Alerts raised
    pub created: usize,
    /// Open alerts whose snapshot changed
    pub refreshed: usize,
    /// Alerts closed
    pub resolved: usize,
    /// Parts whose reconciliation failed and will be retried next time
    pub failed: usize,
    /// Parts low or out of stock at the time they were checked
    pub low_stock_parts: usize,
    /// Stopped early because of shutdown
    pub cancelled: bool,
}

/// Outcome of asking for a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The sweep ran
    Completed(SweepReport),
    /// Another sweep was already running; this trigger was dropped
    Skipped,
}

/// Drives the evaluator's sweep on a fixed interval until cancelled
pub struct Sweeper {
    evaluator: Arc<AlertEvaluator>,
    every: Duration,
}

impl Sweeper {
    /// Create a sweeper
    pub fn new(evaluator: Arc<AlertEvaluator>, every: Duration) -> Self {
        Self { evaluator, every }
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = %humantime::format_duration(self.every), "Alert sweep scheduler started");

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.evaluator.run_sweep_until(&cancel).await {
                        error!(error = %e, "Error in scheduled alert sweep");
                    }
                }
            }
        }

        info!("Alert sweep scheduler stopped");
    }

    /// Spawn onto the runtime
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_refuses_overlap_and_resets() {
        let latch = SweepLatch::default();
        assert_eq!(latch.state(), SweepState::Idle);

        let guard = latch.try_enter().expect("idle latch should open");
        assert_eq!(latch.state(), SweepState::Running);
        assert!(latch.try_enter().is_none());

        drop(guard);
        assert_eq!(latch.state(), SweepState::Idle);
        assert!(latch.try_enter().is_some());
    }
}
