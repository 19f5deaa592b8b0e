//! In-memory repositories for tests and local development

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Alert, AlertCounts, NewAlert, NewPart, Part};
use crate::repository::{AlertRepository, AlertScope, PartRepository};

/// Part store backed by a map
#[derive(Default)]
pub struct InMemoryPartRepository {
    parts: Mutex<HashMap<Uuid, Part>>,
}

impl InMemoryPartRepository {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a quantity without going through `adjust_stock`,
    /// as a direct database write would
    pub fn set_quantity(&self, id: Uuid, quantity: i32) -> Result<Part> {
        let mut parts = self.parts.lock();
        let part = parts.get_mut(&id).ok_or_else(|| Error::not_found("Part", id))?;
        part.quantity_in_stock = quantity;
        part.updated_at = Some(Utc::now());
        Ok(part.clone())
    }
}

#[async_trait]
impl PartRepository for InMemoryPartRepository {
    async fn get(&self, id: Uuid) -> Result<Part> {
        self.parts
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("Part", id))
    }

    async fn list(&self) -> Result<Vec<Part>> {
        let mut parts: Vec<Part> = self
            .parts
            .lock()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        parts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(parts)
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Part> {
        let mut parts = self.parts.lock();
        let part = parts.get_mut(&id).ok_or_else(|| Error::not_found("Part", id))?;
        part.quantity_in_stock = part.checked_adjustment(delta)?;
        part.updated_at = Some(Utc::now());
        Ok(part.clone())
    }

    async fn create(&self, input: NewPart) -> Result<Part> {
        input.validate()?;
        let mut parts = self.parts.lock();
        if parts.values().any(|p| p.part_number == input.part_number) {
            return Err(Error::Conflict(format!(
                "part number '{}' already exists",
                input.part_number
            )));
        }
        let part = input.into_part(Uuid::new_v4(), Utc::now());
        parts.insert(part.id, part.clone());
        Ok(part)
    }
}

/// Alert store backed by a vector, with failure injection
#[derive(Default)]
pub struct InMemoryAlertRepository {
    alerts: Mutex<Vec<Alert>>,
    unavailable: AtomicBool,
}

impl InMemoryAlertRepository {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `RepositoryUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::unavailable("alert store offline"));
        }
        Ok(())
    }

    /// Snapshot of every stored alert
    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

/// Scope over the in-memory store. Writes apply immediately; callers hold
/// the evaluator's per-part lock for the scope's lifetime.
struct InMemoryAlertScope<'a> {
    repo: &'a InMemoryAlertRepository,
    part: Part,
}

#[async_trait]
impl AlertScope for InMemoryAlertScope<'_> {
    fn part(&self) -> &Part {
        &self.part
    }

    async fn find_unresolved(&mut self) -> Result<Option<Alert>> {
        AlertRepository::find_unresolved(self.repo, self.part.id).await
    }

    async fn create(&mut self, alert: NewAlert) -> Result<Alert> {
        AlertRepository::create(self.repo, alert).await
    }

    async fn update(&mut self, alert: &Alert) -> Result<Alert> {
        AlertRepository::update(self.repo, alert).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn begin<'a>(
        &'a self,
        part_id: Uuid,
        parts: &'a dyn PartRepository,
    ) -> Result<Box<dyn AlertScope + 'a>> {
        self.check_available()?;
        let part = parts.get(part_id).await?;
        Ok(Box::new(InMemoryAlertScope { repo: self, part }))
    }

    async fn get(&self, id: Uuid) -> Result<Alert> {
        self.check_available()?;
        self.alerts
            .lock()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("Alert", id))
    }

    async fn find_unresolved(&self, part_id: Uuid) -> Result<Option<Alert>> {
        self.check_available()?;
        Ok(self
            .alerts
            .lock()
            .iter()
            .find(|a| a.part_id == part_id && !a.is_resolved)
            .cloned())
    }

    async fn create(&self, alert: NewAlert) -> Result<Alert> {
        self.check_available()?;
        let mut alerts = self.alerts.lock();
        if alerts.iter().any(|a| a.part_id == alert.part_id && !a.is_resolved) {
            return Err(Error::Conflict(format!(
                "unresolved alert already exists for part {}",
                alert.part_id
            )));
        }
        let alert = alert.into_alert(Uuid::new_v4(), Utc::now());
        alerts.push(alert.clone());
        Ok(alert)
    }

    async fn update(&self, alert: &Alert) -> Result<Alert> {
        self.check_available()?;
        let mut alerts = self.alerts.lock();
        if !alert.is_resolved
            && alerts
                .iter()
                .any(|a| a.id != alert.id && a.part_id == alert.part_id && !a.is_resolved)
        {
            return Err(Error::Conflict(format!(
                "unresolved alert already exists for part {}",
                alert.part_id
            )));
        }
        let slot = alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or_else(|| Error::not_found("Alert", alert.id))?;
        *slot = alert.clone();
        Ok(alert.clone())
    }

    async fn list_all(&self, active_only: bool) -> Result<Vec<Alert>> {
        self.check_available()?;
        let mut alerts: Vec<Alert> = self
            .alerts
            .lock()
            .iter()
            .filter(|a| !active_only || !a.is_resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn counts(&self) -> Result<AlertCounts> {
        self.check_available()?;
        let alerts = self.alerts.lock();
        Ok(AlertCounts {
            total: alerts.len() as u64,
            active: alerts.iter().filter(|a| !a.is_resolved).count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_adjust_stock_rejects_negative_and_keeps_quantity() {
        let repo = InMemoryPartRepository::new();
        let part = repo.create(NewPart::new("P-1", "Seal", 5, 10)).await.unwrap();

        let err = repo.adjust_stock(part.id, -20).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAdjustment { .. }));
        assert_eq!(repo.get(part.id).await.unwrap().quantity_in_stock, 5);

        let part = repo.adjust_stock(part.id, 10).await.unwrap();
        assert_eq!(part.quantity_in_stock, 15);
    }

    #[tokio::test]
    async fn test_unknown_part_is_not_found() {
        let repo = InMemoryPartRepository::new();
        assert!(matches!(
            repo.adjust_stock(Uuid::new_v4(), 1).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_part_number_conflicts() {
        let repo = InMemoryPartRepository::new();
        repo.create(NewPart::new("P-1", "Seal", 5, 10)).await.unwrap();
        assert!(matches!(
            repo.create(NewPart::new("P-1", "Other", 1, 1)).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_second_unresolved_alert_conflicts() {
        let parts = InMemoryPartRepository::new();
        let alerts = InMemoryAlertRepository::new();
        let part = parts.create(NewPart::new("P-1", "Seal", 5, 10)).await.unwrap();

        let mut first = alerts.create(NewAlert::for_part(&part)).await.unwrap();
        assert!(matches!(
            alerts.create(NewAlert::for_part(&part)).await,
            Err(Error::Conflict(_))
        ));

        first.resolve(Utc::now());
        alerts.update(&first).await.unwrap();
        alerts.create(NewAlert::for_part(&part)).await.unwrap();

        let counts = alerts.counts().await.unwrap();
        assert_eq!(counts, AlertCounts { total: 2, active: 1 });
    }

    #[tokio::test]
    async fn test_get_alert_by_id() {
        let parts = InMemoryPartRepository::new();
        let alerts = InMemoryAlertRepository::new();
        let part = parts.create(NewPart::new("P-1", "Seal", 5, 10)).await.unwrap();
        let created = alerts.create(NewAlert::for_part(&part)).await.unwrap();

        assert_eq!(alerts.get(created.id).await.unwrap(), created);
        assert!(matches!(
            alerts.get(Uuid::new_v4()).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_scope_reads_live_part() {
        let parts = InMemoryPartRepository::new();
        let alerts = InMemoryAlertRepository::new();
        let part = parts.create(NewPart::new("P-1", "Seal", 5, 10)).await.unwrap();
        parts.set_quantity(part.id, 42).unwrap();

        let scope = alerts.begin(part.id, &parts).await.unwrap();
        assert_eq!(scope.part().quantity_in_stock, 42);
        scope.commit().await.unwrap();

        assert!(matches!(
            alerts.begin(Uuid::new_v4(), &parts).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let alerts = InMemoryAlertRepository::new();
        alerts.set_unavailable(true);
        let err = alerts.list_all(false).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
