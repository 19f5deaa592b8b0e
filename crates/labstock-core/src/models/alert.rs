//! Alert data models

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::part::{Part, StockStatus};

/// A low-stock alert raised for a part.
///
/// Alerts are never deleted; resolving one keeps it as an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
    /// Unique identifier
    pub id: Uuid,

    /// The part this alert is for
    pub part_id: Uuid,

    /// Pre-formatted message with part details
    pub message: String,

    /// Stock on hand when the alert was last written
    pub current_stock: i32,

    /// Minimum stock level when the alert was last written
    pub threshold_stock: i32,

    /// Whether stock has been replenished
    pub is_resolved: bool,

    /// When the alert was raised
    pub created_at: DateTime<Utc>,

    /// When the snapshot was last refreshed
    pub updated_at: DateTime<Utc>,

    /// When the alert was resolved (if resolved)
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Whether the alert is still open
    pub fn is_active(&self) -> bool {
        !self.is_resolved
    }

    /// Mark the alert resolved at `at`
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.is_resolved = true;
        self.resolved_at = Some(at);
        self.updated_at = at;
    }

    /// Refresh the snapshot from the part's current state.
    ///
    /// Returns false when nothing changed.
    pub fn refresh(&mut self, part: &Part, at: DateTime<Utc>) -> bool {
        let message = alert_message(part, part.stock_status());
        if self.current_stock == part.quantity_in_stock
            && self.threshold_stock == part.minimum_stock_level
            && self.message == message
        {
            return false;
        }
        self.current_stock = part.quantity_in_stock;
        self.threshold_stock = part.minimum_stock_level;
        self.message = message;
        self.updated_at = at;
        true
    }
}

/// Input for creating a new alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    /// Part the alert is raised for
    pub part_id: Uuid,
    /// Human-readable alert text
    pub message: String,
    /// Stock level when raised
    pub current_stock: i32,
    /// Minimum stock level when raised
    pub threshold_stock: i32,
}

impl NewAlert {
    /// Snapshot a low or out-of-stock part
    pub fn for_part(part: &Part) -> Self {
        Self {
            part_id: part.id,
            message: alert_message(part, part.stock_status()),
            current_stock: part.quantity_in_stock,
            threshold_stock: part.minimum_stock_level,
        }
    }

    /// Materialize into a stored, unresolved alert
    pub fn into_alert(self, id: Uuid, now: DateTime<Utc>) -> Alert {
        Alert {
            id,
            part_id: self.part_id,
            message: self.message,
            current_stock: self.current_stock,
            threshold_stock: self.threshold_stock,
            is_resolved: false,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }
}

/// Build the alert message for a part in the given status
pub fn alert_message(part: &Part, status: StockStatus) -> String {
    let headline = match status {
        StockStatus::OutOfStock => "OUT OF STOCK ALERT!",
        _ => "LOW STOCK ALERT!",
    };

    let mut lines = vec![
        headline.to_string(),
        "Parts need to be purchased:".to_string(),
        format!("Part Number: {}", part.part_number),
        format!("Part Name: {}", part.name),
        format!("Current Stock: {}", part.quantity_in_stock),
        format!("Minimum Required: {}", part.minimum_stock_level),
    ];

    if let Some(manufacturer) = part.manufacturer.as_deref().filter(|m| !m.is_empty()) {
        lines.push(format!("Manufacturer: {manufacturer}"));
    }
    if part.is_critical {
        lines.push("Critical part".to_string());
    }

    lines.join("\n")
}

/// Alert row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    /// All alerts ever created
    pub total: u64,
    /// Unresolved alerts
    pub active: u64,
}

/// Aggregate alert statistics, computed on demand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    /// All alerts ever created
    pub total_alerts: u64,
    /// Unresolved alerts
    pub active_alerts: u64,
    /// Resolved alerts
    pub resolved_alerts: u64,
    /// Distinct parts currently low or out of stock
    pub critical_parts_low: u64,
    /// Distinct parts with nothing in stock
    pub out_of_stock_parts: u64,
}

/// Notification channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Slack webhook
    Slack {
        webhook_url: String,
        channel: Option<String>,
    },
    /// Generic webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl NotificationChannel {
    /// Short channel type name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Slack { .. } => "slack",
            Self::Webhook { .. } => "webhook",
        }
    }
}
