//! Alerting system for LabStock
//!
//! Classifies stock levels, keeps one open alert per low part, summarizes
//! alert state and sweeps all parts periodically.

mod evaluator;
mod notifier;
mod reconciler;
pub mod summary;
mod sweep;

pub use evaluator::{AlertEvaluator, StockAdjustment};
pub use notifier::{NotificationResult, NotificationSender};
pub use reconciler::{plan, ReconcileAction, Reconciler, Reconciliation};
pub use sweep::{SweepGuard, SweepLatch, SweepOutcome, SweepReport, SweepState, Sweeper};
