//! # LabStock
//!
//! Inventory tracking and low-stock alerting for laboratory parts.
//!
//! LabStock classifies each part's stock against its minimum level, keeps at
//! most one open alert per low part, and sweeps the whole inventory on a
//! schedule to catch changes made outside the API.
//!
//! ## Architecture
//!
//! - **Alerting**: Classification, alert reconciliation, summaries and sweeps
//! - **Storage**: PostgreSQL behind repository traits, with in-memory stores for tests
//! - **API**: REST API for stock adjustments and alert queries
//!
//! ## Quick Start
//!
//! ```bash
//! # Start the API server and scheduled sweeps
//! labstock serve
//!
//! # Run one sweep and exit
//! labstock sweep
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertEvaluator, Sweeper};
    pub use crate::config::Config;
    pub use crate::db::Database;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::repository::{AlertRepository, PartRepository};
}
