//! API handlers for the HTTP REST API

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::alerting::{AlertEvaluator, StockAdjustment, SweepOutcome, SweepState};
use crate::error::Error;
use crate::models::{Alert, AlertSummary, NewPart, PartView, StockUpdate};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Alert evaluator backing every endpoint
    pub evaluator: Arc<AlertEvaluator>,
    /// Prometheus handle; `/metrics` is 404 without one
    pub metrics: Option<PrometheusHandle>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Map a domain error onto an HTTP status
pub fn api_error(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::InvalidAdjustment { .. } | Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::RepositoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok` when the process answers
    pub status: String,
    /// Crate version
    pub version: String,
    /// Whether a sweep is running right now
    pub sweep: SweepState,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sweep: state.evaluator.sweep_state(),
    })
}

/// Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Query parameters for listing parts
#[derive(Debug, Deserialize)]
pub struct ListPartsQuery {
    /// Case-insensitive match on name or part number
    pub q: Option<String>,
}

/// List active parts
pub async fn list_parts(
    State(state): State<AppState>,
    Query(query): Query<ListPartsQuery>,
) -> ApiResult<Vec<PartView>> {
    let parts = state.evaluator.parts().list().await.map_err(api_error)?;

    let needle = query.q.map(|q| q.to_lowercase());
    let parts = parts
        .into_iter()
        .filter(|p| match &needle {
            Some(n) => {
                p.name.to_lowercase().contains(n) || p.part_number.to_lowercase().contains(n)
            }
            None => true,
        })
        .map(PartView::from)
        .collect();

    Ok(Json(parts))
}

/// Get a single part by ID
pub async fn get_part(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
) -> ApiResult<PartView> {
    let part = state.evaluator.parts().get(part_id).await.map_err(api_error)?;
    Ok(Json(part.into()))
}

/// Register a new part
pub async fn create_part(
    State(state): State<AppState>,
    Json(req): Json<NewPart>,
) -> Result<(StatusCode, Json<PartView>), (StatusCode, String)> {
    let part = state.evaluator.parts().create(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(part.into())))
}

/// Adjust stock for a part and reconcile its alert
pub async fn update_stock(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(req): Json<StockUpdate>,
) -> ApiResult<StockAdjustment> {
    let result = state
        .evaluator
        .adjust_stock(part_id, req.quantity_change)
        .await
        .map_err(api_error)?;

    Ok(Json(result))
}

/// Query parameters for listing alerts
#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    /// Only unresolved alerts (default true)
    pub active_only: Option<bool>,
    /// Alerts to skip from the newest
    pub skip: Option<usize>,
    /// Maximum alerts returned (default 100)
    pub limit: Option<usize>,
}

/// List alerts, newest first
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<ListAlertsQuery>,
) -> ApiResult<Vec<Alert>> {
    let alerts = state
        .evaluator
        .list_alerts(query.active_only.unwrap_or(true))
        .await
        .map_err(api_error)?;

    Ok(Json(
        alerts
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(100))
            .collect(),
    ))
}

/// Parts currently low or out of stock
pub async fn low_stock_parts(State(state): State<AppState>) -> ApiResult<Vec<PartView>> {
    let parts = state.evaluator.low_stock_parts().await.map_err(api_error)?;
    Ok(Json(parts.into_iter().map(PartView::from).collect()))
}

/// Alert summary statistics
pub async fn alert_summary(State(state): State<AppState>) -> ApiResult<AlertSummary> {
    let summary = state.evaluator.summarize().await.map_err(api_error)?;
    Ok(Json(summary))
}

/// Sweep trigger response
#[derive(Serialize)]
pub struct SweepTriggerResponse {
    /// False when a sweep was already running and this trigger was dropped
    pub accepted: bool,
    /// Sweep state at the time of the trigger
    pub state: SweepState,
}

/// Start a sweep in the background
pub async fn trigger_sweep(
    State(state): State<AppState>,
) -> (StatusCode, Json<SweepTriggerResponse>) {
    let previous = state.evaluator.sweep_state();
    let evaluator = state.evaluator.clone();

    tokio::spawn(async move {
        match evaluator.run_sweep().await {
            Ok(SweepOutcome::Completed(_) | SweepOutcome::Skipped) => {}
            Err(e) => error!(error = %e, "Triggered alert sweep failed"),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(SweepTriggerResponse {
            accepted: previous == SweepState::Idle,
            state: previous,
        }),
    )
}
