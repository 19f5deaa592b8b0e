//! Database layer for LabStock
//!
//! Postgres-backed repositories plus in-memory stand-ins.

mod memory;
mod postgres;

pub use memory::{InMemoryAlertRepository, InMemoryPartRepository};
pub use postgres::{PgAlertRepository, PgAlertScope, PgPartRepository, PostgresPool};

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::repository::{AlertRepository, PartRepository};

/// Database connection bundle
#[derive(Clone)]
pub struct Database {
    /// PostgreSQL connection pool
    pub postgres: PostgresPool,
}

impl Database {
    /// Connect and, if configured, run migrations
    pub async fn new(config: &Config) -> Result<Self> {
        let postgres = PostgresPool::new(&config.database).await?;
        let db = Self { postgres };

        if config.database.run_migrations {
            db.migrate().await?;
        }

        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        self.postgres.migrate().await
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        self.postgres.health_check().await
    }

    /// Repository pair backed by this database
    pub fn repositories(&self) -> (Arc<dyn PartRepository>, Arc<dyn AlertRepository>) {
        (
            Arc::new(PgPartRepository::new(&self.postgres)),
            Arc::new(PgAlertRepository::new(&self.postgres)),
        )
    }
}
