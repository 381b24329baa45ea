use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tracing::warn;
use uuid::Uuid;

use crate::batches::repo_types::{BatchStatus, BatchUnit, BatchWithCrop, HarvestBatch};
use crate::error::MarketError;
use crate::risk::StorageConditions;

/// Accepts an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub(crate) fn parse_harvest_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

fn de_harvest_date<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse_harvest_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid harvest date: {raw}")))
}

fn de_opt_harvest_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<OffsetDateTime>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => parse_harvest_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid harvest date: {raw}"))),
    }
}

fn check_quantity(quantity: f64) -> Result<(), MarketError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(MarketError::InvalidInput("Quantity must be greater than zero".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    #[serde(alias = "crop_template_id")]
    pub crop_id: i32,
    pub quantity: f64,
    pub unit: BatchUnit,
    #[serde(deserialize_with = "de_harvest_date")]
    pub harvest_date: OffsetDateTime,
    #[serde(default)]
    pub storage_conditions: StorageConditions,
}

impl CreateBatchRequest {
    pub fn validate(&self) -> Result<(), MarketError> {
        check_quantity(self.quantity)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBatchRequest {
    pub quantity: Option<f64>,
    pub unit: Option<BatchUnit>,
    #[serde(default, deserialize_with = "de_opt_harvest_date")]
    pub harvest_date: Option<OffsetDateTime>,
    pub storage_conditions: Option<StorageConditions>,
}

impl UpdateBatchRequest {
    pub fn validate(&self) -> Result<(), MarketError> {
        if let Some(q) = self.quantity {
            check_quantity(q)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BatchStatus,
}

#[derive(Debug, Serialize)]
pub struct CropSummary {
    pub name: String,
    pub category: String,
    pub spoilage_sensitivity: i32,
    pub shelf_life_days: i32,
}

/// Batch as returned to its farmer, with the risk computed at read time.
#[derive(Debug, Serialize)]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: HarvestBatch,
    pub crop: CropSummary,
    pub spoilage_risk_level: Option<u8>,
}

impl BatchView {
    pub fn new(row: BatchWithCrop, now: OffsetDateTime) -> Self {
        let spoilage_risk_level = match row.risk_level(now) {
            Ok(level) => Some(level),
            Err(e) => {
                warn!(batch_id = %row.batch.id, crop = %row.crop_name, error = %e, "risk not computable");
                None
            }
        };
        Self {
            crop: CropSummary {
                name: row.crop_name,
                category: row.crop_category,
                spoilage_sensitivity: row.spoilage_sensitivity,
                shelf_life_days: row.shelf_life_days,
            },
            batch: row.batch,
            spoilage_risk_level,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusChanged {
    pub id: Uuid,
    pub batch_code: String,
    pub status: BatchStatus,
}

#[derive(Debug, Serialize)]
pub struct QrCodeResponse {
    pub batch_code: String,
    /// JSON text to encode into the QR image.
    pub qr_data: String,
    pub qr_payload: Value,
}
