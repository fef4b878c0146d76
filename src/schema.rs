use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------
// Entity
// ------------------------------------------------------------
//
// A participant whose dataset is collected independently.
// Supplied by the entity directory and read-only to the engine.
//
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique key, used as the path segment of every upstream call
    pub code: String,

    pub display_name: String,
}

impl Entity {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
        }
    }
}

// ------------------------------------------------------------
// IdPage (list call response)
// ------------------------------------------------------------
//
// Wire shape:
//   { "clientCode": "...", "date": "2026-01-01", "totalCount": 100, "outboundIds": [...] }
//
// Produced once per (entity, date). The engine only chunks it.
//
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdPage {
    #[serde(rename = "clientCode")]
    pub entity_code: String,

    #[serde(rename = "date")]
    pub date_partition: NaiveDate,

    pub total_count: usize,

    #[serde(rename = "outboundIds")]
    pub ids: Vec<String>,
}

// ------------------------------------------------------------
// Detail call request / response
// ------------------------------------------------------------

/// Body of the detail call: `{ "outboundIds": [...] }`
#[derive(Debug, Clone, Serialize)]
pub struct IdBatchRequest<'a> {
    #[serde(rename = "outboundIds")]
    pub ids: &'a [String],
}

/// Detail call response: `{ "data": [...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailBatch {
    pub data: Vec<DetailRecord>,
}

/// A single detail record. Identity is `source_id` scoped by `entity_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    #[serde(rename = "outboundId")]
    pub source_id: String,

    #[serde(rename = "clientCode")]
    pub entity_code: String,

    #[serde(rename = "orderNo")]
    pub order_ref: String,

    pub status: DeliveryStatus,

    #[serde(rename = "shippedAt")]
    pub shipped_at: NaiveDateTime,

    pub costs: Vec<CostLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Shipped,
    Delivered,
    InTransit,
    Pending,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 4] = [
        DeliveryStatus::Shipped,
        DeliveryStatus::Delivered,
        DeliveryStatus::InTransit,
        DeliveryStatus::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Shipped => "SHIPPED",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLine {
    pub cost_type: CostType,

    /// Exact decimal amount; never a float
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostType {
    Shipping,
    Packing,
    Handling,
}

impl CostType {
    pub const ALL: [CostType; 3] = [CostType::Shipping, CostType::Packing, CostType::Handling];

    pub fn as_str(&self) -> &'static str {
        match self {
            CostType::Shipping => "SHIPPING",
            CostType::Packing => "PACKING",
            CostType::Handling => "HANDLING",
        }
    }
}

impl fmt::Display for CostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------
// CollectResult
// ------------------------------------------------------------
//
// Created once per successful run and returned to the caller.
// Failed runs never produce one.
//
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResult {
    pub total_records_written: usize,
    pub total_cost_lines_written: usize,
    pub api_call_count: usize,
    pub elapsed_millis: u64,
}
