//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))

        // Parts
        .route("/api/parts", get(handlers::list_parts).post(handlers::create_part))
        .route("/api/parts/:part_id", get(handlers::get_part))
        .route("/api/parts/:part_id/stock", post(handlers::update_stock))

        // Alerts
        .route("/api/alerts", get(handlers::list_alerts))
        .route("/api/alerts/low-stock", get(handlers::low_stock_parts))
        .route("/api/alerts/summary", get(handlers::alert_summary))
        .route("/api/alerts/sweep", post(handlers::trigger_sweep))

        .with_state(state)
}
