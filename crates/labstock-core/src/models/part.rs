//! Part data models and stock classification

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Stock level of a part relative to its minimum threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    /// Nothing left on the shelf
    OutOfStock,
    /// Some stock, but at or below the minimum level
    LowStock,
    /// Above the minimum level
    InStock,
}

impl StockStatus {
    /// Classify a quantity against a minimum stock level.
    ///
    /// Quantities are validated non-negative before they get here; anything
    /// at or below zero is treated as out of stock.
    pub fn classify(quantity: i32, minimum: i32) -> Self {
        if quantity <= 0 {
            Self::OutOfStock
        } else if quantity <= minimum {
            Self::LowStock
        } else {
            Self::InStock
        }
    }

    /// Whether this status calls for an open alert
    pub fn needs_alert(self) -> bool {
        !matches!(self, Self::InStock)
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Self::OutOfStock => "Out of stock",
            Self::LowStock => "Low stock",
            Self::InStock => "In stock",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An inventory part that can be used across instruments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Part {
    /// Unique identifier
    pub id: Uuid,

    /// Catalogue part number (unique)
    pub part_number: String,

    /// Display name
    pub name: String,

    /// Free-form description
    pub description: Option<String>,

    /// Grouping such as "Vacuum" or "Consumables"
    pub category: Option<String>,

    /// Manufacturer name
    pub manufacturer: Option<String>,

    /// Units currently on hand
    pub quantity_in_stock: i32,

    /// Threshold at or below which the part is considered low
    pub minimum_stock_level: i32,

    /// Unit such as "each", "g" or "ml"
    pub unit_of_measure: Option<String>,

    /// Parts flagged for close monitoring
    pub is_critical: bool,

    /// Inactive parts are hidden from listings and summaries
    pub is_active: bool,

    /// When the part was created
    pub created_at: DateTime<Utc>,

    /// When the part was last modified
    pub updated_at: Option<DateTime<Utc>>,
}

impl Part {
    /// Current stock status
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.quantity_in_stock, self.minimum_stock_level)
    }

    /// Whether the part is low or out of stock
    pub fn is_low_stock(&self) -> bool {
        self.stock_status().needs_alert()
    }

    /// Quantity after applying `delta`, or `InvalidAdjustment` if it would go negative
    pub fn checked_adjustment(&self, delta: i32) -> Result<i32> {
        match self.quantity_in_stock.checked_add(delta) {
            Some(q) if q >= 0 => Ok(q),
            _ => Err(Error::invalid_adjustment(
                self.id,
                delta,
                self.quantity_in_stock,
            )),
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.part_number, self.name)
    }
}

/// Part as returned by the API, with its derived status attached
#[derive(Debug, Clone, Serialize)]
pub struct PartView {
    /// The stored part
    #[serde(flatten)]
    pub part: Part,
    /// Derived stock status
    pub stock_status: StockStatus,
}

impl From<Part> for PartView {
    fn from(part: Part) -> Self {
        let stock_status = part.stock_status();
        Self { part, stock_status }
    }
}

/// Input for creating a new part
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPart {
    /// Unique catalogue number
    pub part_number: String,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Category label
    pub category: Option<String>,
    /// Manufacturer name
    pub manufacturer: Option<String>,
    /// Starting stock, must not be negative
    pub quantity_in_stock: i32,
    /// Alert threshold, must not be negative
    pub minimum_stock_level: i32,
    /// Unit stock is counted in
    pub unit_of_measure: Option<String>,
    /// Flag for parts an instrument cannot run without
    #[serde(default)]
    pub is_critical: bool,
}

impl NewPart {
    /// Shorthand for the fields alerting cares about
    pub fn new(part_number: impl Into<String>, name: impl Into<String>, quantity: i32, minimum: i32) -> Self {
        Self {
            part_number: part_number.into(),
            name: name.into(),
            quantity_in_stock: quantity,
            minimum_stock_level: minimum,
            unit_of_measure: Some("each".to_string()),
            ..Default::default()
        }
    }

    /// Set the manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Check the input before it is persisted
    pub fn validate(&self) -> Result<()> {
        if self.part_number.trim().is_empty() {
            return Err(Error::validation("part_number must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("name must not be empty"));
        }
        if self.quantity_in_stock < 0 {
            return Err(Error::validation("quantity_in_stock must be >= 0"));
        }
        if self.minimum_stock_level < 0 {
            return Err(Error::validation("minimum_stock_level must be >= 0"));
        }
        Ok(())
    }

    /// Materialize into a stored part
    pub fn into_part(self, id: Uuid, now: DateTime<Utc>) -> Part {
        Part {
            id,
            part_number: self.part_number,
            name: self.name,
            description: self.description,
            category: self.category,
            manufacturer: self.manufacturer,
            quantity_in_stock: self.quantity_in_stock,
            minimum_stock_level: self.minimum_stock_level,
            unit_of_measure: self.unit_of_measure,
            is_critical: self.is_critical,
            is_active: true,
            created_at: now,
            updated_at: None,
        }
    }
}

/// Request body for a stock adjustment
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StockUpdate {
    /// Positive to add stock, negative to remove it
    pub quantity_change: i32,
}
