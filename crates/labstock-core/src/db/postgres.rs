//! PostgreSQL connection and queries

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use tracing::debug;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{Alert, AlertCounts, NewAlert, NewPart, Part};
use crate::repository::{AlertRepository, AlertScope, PartRepository};

/// PostgreSQL connection pool
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Create a new PostgreSQL connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Repository for part records
#[derive(Clone)]
pub struct PgPartRepository {
    pool: PgPool,
}

impl PgPartRepository {
    /// Create a new part repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

#[async_trait]
impl PartRepository for PgPartRepository {
    async fn get(&self, id: Uuid) -> Result<Part> {
        sqlx::query_as::<_, Part>("SELECT * FROM parts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Part", id))
    }

    async fn list(&self) -> Result<Vec<Part>> {
        let parts = sqlx::query_as::<_, Part>(
            "SELECT * FROM parts WHERE is_active = true ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(parts)
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Part> {
        // Single conditional update: the row lock it takes serializes
        // concurrent adjustments, and a failed guard leaves the row untouched.
        let updated = sqlx::query_as::<_, Part>(
            r#"
            UPDATE parts
            SET quantity_in_stock = quantity_in_stock + $2,
                updated_at = $3
            WHERE id = $1
              AND quantity_in_stock::bigint + $2 BETWEEN 0 AND 2147483647
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(part) = updated {
            return Ok(part);
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT quantity_in_stock FROM parts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match available {
            Some(available) => {
                debug!(part_id = %id, delta, available, "Rejected stock adjustment");
                Err(Error::invalid_adjustment(id, delta, available))
            }
            None => Err(Error::not_found("Part", id)),
        }
    }

    async fn create(&self, input: NewPart) -> Result<Part> {
        input.validate()?;

        let part = sqlx::query_as::<_, Part>(
            r#"
            INSERT INTO parts (
                id, part_number, name, description, category, manufacturer,
                quantity_in_stock, minimum_stock_level, unit_of_measure,
                is_critical, is_active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, true, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.part_number)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(&input.manufacturer)
        .bind(input.quantity_in_stock)
        .bind(input.minimum_stock_level)
        .bind(&input.unit_of_measure)
        .bind(input.is_critical)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(part)
    }
}

/// Repository for alert records
#[derive(Clone)]
pub struct PgAlertRepository {
    pool: PgPool,
}

impl PgAlertRepository {
    /// Create a new alert repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

async fn find_unresolved_alert<'e, E: PgExecutor<'e>>(
    executor: E,
    part_id: Uuid,
) -> Result<Option<Alert>> {
    let alert = sqlx::query_as::<_, Alert>(
        "SELECT * FROM alerts WHERE part_id = $1 AND is_resolved = false LIMIT 1",
    )
    .bind(part_id)
    .fetch_optional(executor)
    .await?;

    Ok(alert)
}

async fn insert_alert<'e, E: PgExecutor<'e>>(executor: E, alert: &NewAlert) -> Result<Alert> {
    let now = Utc::now();

    // alerts_one_unresolved_per_part turns a lost race into Error::Conflict
    let alert = sqlx::query_as::<_, Alert>(
        r#"
        INSERT INTO alerts (
            id, part_id, message, current_stock, threshold_stock,
            is_resolved, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, false, $6, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(alert.part_id)
    .bind(&alert.message)
    .bind(alert.current_stock)
    .bind(alert.threshold_stock)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(alert)
}

async fn update_alert<'e, E: PgExecutor<'e>>(executor: E, alert: &Alert) -> Result<Alert> {
    sqlx::query_as::<_, Alert>(
        r#"
        UPDATE alerts SET
            message = $2,
            current_stock = $3,
            threshold_stock = $4,
            is_resolved = $5,
            resolved_at = $6,
            updated_at = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(alert.id)
    .bind(&alert.message)
    .bind(alert.current_stock)
    .bind(alert.threshold_stock)
    .bind(alert.is_resolved)
    .bind(alert.resolved_at)
    .bind(alert.updated_at)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| Error::not_found("Alert", alert.id))
}

/// Alert scope inside a transaction holding `FOR UPDATE` on the part row.
///
/// Stock adjustments and other scopes for the same part wait on that row
/// lock, across processes, until commit or rollback.
pub struct PgAlertScope {
    tx: Transaction<'static, Postgres>,
    part: Part,
}

#[async_trait]
impl AlertScope for PgAlertScope {
    fn part(&self) -> &Part {
        &self.part
    }

    async fn find_unresolved(&mut self) -> Result<Option<Alert>> {
        find_unresolved_alert(&mut *self.tx, self.part.id).await
    }

    async fn create(&mut self, alert: NewAlert) -> Result<Alert> {
        insert_alert(&mut *self.tx, &alert).await
    }

    async fn update(&mut self, alert: &Alert) -> Result<Alert> {
        update_alert(&mut *self.tx, alert).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn begin<'a>(
        &'a self,
        part_id: Uuid,
        _parts: &'a dyn PartRepository,
    ) -> Result<Box<dyn AlertScope + 'a>> {
        let mut tx = self.pool.begin().await?;

        let part = sqlx::query_as::<_, Part>("SELECT * FROM parts WHERE id = $1 FOR UPDATE")
            .bind(part_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("Part", part_id))?;

        Ok(Box::new(PgAlertScope { tx, part }))
    }

    async fn get(&self, id: Uuid) -> Result<Alert> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Alert", id))
    }

    async fn find_unresolved(&self, part_id: Uuid) -> Result<Option<Alert>> {
        find_unresolved_alert(&self.pool, part_id).await
    }

    async fn create(&self, alert: NewAlert) -> Result<Alert> {
        insert_alert(&self.pool, &alert).await
    }

    async fn update(&self, alert: &Alert) -> Result<Alert> {
        update_alert(&self.pool, alert).await
    }

    async fn list_all(&self, active_only: bool) -> Result<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE ($1 = false OR is_resolved = false)
            ORDER BY created_at DESC
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    async fn counts(&self) -> Result<AlertCounts> {
        let (total, active): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_resolved = false) AS active
            FROM alerts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AlertCounts {
            total: u64::try_from(total).unwrap_or_default(),
            active: u64::try_from(active).unwrap_or_default(),
        })
    }
}
