//! Read-only mirror of external stock levels.

use serde::{Deserialize, Serialize};

use super::cart::SubjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

/// Stock level for one subject as reported by the inventory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub stock_status: StockStatus,
    pub available_quantity: u32,
}

impl StockLevel {
    pub fn new(stock_status: StockStatus, available_quantity: u32) -> Self {
        Self {
            stock_status,
            available_quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub subject_id: SubjectId,
    pub stock_status: StockStatus,
    pub available_quantity: u32,
}

impl AvailabilitySnapshot {
    pub fn new(subject_id: SubjectId, level: StockLevel) -> Self {
        Self {
            subject_id,
            stock_status: level.stock_status,
            available_quantity: level.available_quantity,
        }
    }

    /// Whether `quantity` units can be supplied right now.
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.stock_status != StockStatus::OutOfStock && self.available_quantity >= quantity
    }
}
