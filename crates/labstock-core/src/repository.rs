//! Repository traits consumed by the alert evaluator
//!
//! Postgres-backed implementations live in [`crate::db`]; in-memory ones are
//! used by tests and the `--in-memory` development mode.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Alert, AlertCounts, NewAlert, NewPart, Part};

/// Read and adjust part records
#[async_trait]
pub trait PartRepository: Send + Sync {
    /// Fetch a part, `NotFound` if it does not exist
    async fn get(&self, id: Uuid) -> Result<Part>;

    /// List all active parts
    async fn list(&self) -> Result<Vec<Part>>;

    /// Atomically add `delta` to the part's quantity.
    ///
    /// Fails with `InvalidAdjustment` and leaves the quantity untouched when
    /// the result would be negative.
    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Part>;

    /// Create a part
    async fn create(&self, input: NewPart) -> Result<Part>;
}

/// Alert reads and writes for one part, made while that part is locked.
///
/// Writes become visible to other scopes on `commit`. Dropping a scope
/// without committing abandons its writes where the store is transactional.
#[async_trait]
pub trait AlertScope: Send {
    /// The part as it stood when the lock was taken
    fn part(&self) -> &Part;

    /// The part's unresolved alert, if any
    async fn find_unresolved(&mut self) -> Result<Option<Alert>>;

    /// Insert a new unresolved alert
    async fn create(&mut self, alert: NewAlert) -> Result<Alert>;

    /// Persist changes to an existing alert
    async fn update(&mut self, alert: &Alert) -> Result<Alert>;

    /// Make the scope's writes visible and release the part
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Read and write alert records.
///
/// Implementations must reject a second unresolved alert for the same part
/// with `Conflict`.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Lock `part_id` and open a scope over its alert state.
    ///
    /// Stores that cannot lock the part row themselves read it through
    /// `parts`. Fails with `NotFound` if the part does not exist.
    async fn begin<'a>(
        &'a self,
        part_id: Uuid,
        parts: &'a dyn PartRepository,
    ) -> Result<Box<dyn AlertScope + 'a>>;

    /// Fetch an alert, `NotFound` if it does not exist
    async fn get(&self, id: Uuid) -> Result<Alert>;

    /// The unresolved alert for a part, if any
    async fn find_unresolved(&self, part_id: Uuid) -> Result<Option<Alert>>;

    /// Insert a new unresolved alert
    async fn create(&self, alert: NewAlert) -> Result<Alert>;

    /// Persist changes to an existing alert
    async fn update(&self, alert: &Alert) -> Result<Alert>;

    /// All alerts, newest first, optionally only unresolved ones
    async fn list_all(&self, active_only: bool) -> Result<Vec<Alert>>;

    /// Total and unresolved alert counts
    async fn counts(&self) -> Result<AlertCounts>;
}
