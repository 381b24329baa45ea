use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{
    postgres::{PgHasArrayType, PgTypeInfo},
    types::Json,
    FromRow,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MarketError;
use crate::risk::{RiskInput, StorageConditions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "batch_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Available,
    Listed,
    Sold,
    Spoiled,
}

impl PgHasArrayType for BatchStatus {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_batch_status")
    }
}

impl BatchStatus {
    /// Statuses in which the farmer may still edit the batch.
    pub const EDITABLE: [BatchStatus; 3] =
        [BatchStatus::Available, BatchStatus::Listed, BatchStatus::Spoiled];
    /// Statuses in which the batch may be deleted.
    pub const DELETABLE: [BatchStatus; 2] = [BatchStatus::Available, BatchStatus::Spoiled];

    pub fn is_editable(self) -> bool {
        Self::EDITABLE.contains(&self)
    }

    pub fn is_deletable(self) -> bool {
        Self::DELETABLE.contains(&self)
    }

    /// Changes allowed through the status endpoint. Listing a batch goes through
    /// listing creation, which pairs the status with an active listing.
    pub fn can_set_directly(self, next: BatchStatus) -> bool {
        self.can_transition_to(next) && !(self == BatchStatus::Available && next == BatchStatus::Listed)
    }

    /// available -> listed -> sold, listed -> available, anything unsold -> spoiled.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Available, Listed) | (Listed, Sold) | (Listed, Available) | (Available, Spoiled) | (Listed, Spoiled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "batch_unit", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchUnit {
    Kg,
    Bags,
    Crates,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HarvestBatch {
    pub id: Uuid,
    pub batch_code: String,
    pub farmer_id: Uuid,
    pub crop_id: i32,
    pub quantity: f64,
    pub unit: BatchUnit,
    #[serde(with = "time::serde::rfc3339")]
    pub harvest_date: OffsetDateTime,
    pub storage_conditions: Json<StorageConditions>,
    pub status: BatchStatus,
    pub qr_payload: Option<Json<Value>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub(crate) const BATCH_COLUMNS: &str = "b.id, b.batch_code, b.farmer_id, b.crop_id, b.quantity, \
     b.unit, b.harvest_date, b.storage_conditions, b.status, b.qr_payload, b.created_at, b.updated_at";

/// Batch joined with the crop fields the risk estimate needs.
#[derive(Debug, Clone, FromRow)]
pub struct BatchWithCrop {
    #[sqlx(flatten)]
    pub batch: HarvestBatch,
    pub crop_name: String,
    pub crop_category: String,
    pub spoilage_sensitivity: i32,
    pub shelf_life_days: i32,
}

pub(crate) const CROP_JOIN_COLUMNS: &str = "c.name AS crop_name, c.category AS crop_category, \
     c.spoilage_sensitivity, c.shelf_life_days";

impl BatchWithCrop {
    pub fn risk_input(&self) -> RiskInput {
        RiskInput {
            harvest_date: self.batch.harvest_date,
            shelf_life_days: self.shelf_life_days,
            spoilage_sensitivity: self.spoilage_sensitivity,
            storage: self.batch.storage_conditions.0,
        }
    }

    pub fn risk_level(&self, now: OffsetDateTime) -> Result<u8, MarketError> {
        crate::risk::estimate(&self.risk_input(), now).map(|level| level.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BatchStatus::*;

    #[test]
    fn forward_lifecycle_is_allowed() {
        assert!(Available.can_transition_to(Listed));
        assert!(Listed.can_transition_to(Sold));
        assert!(Listed.can_transition_to(Available));
    }

    #[test]
    fn unsold_batches_can_spoil() {
        assert!(Available.can_transition_to(Spoiled));
        assert!(Listed.can_transition_to(Spoiled));
        assert!(!Sold.can_transition_to(Spoiled));
    }

    #[test]
    fn listing_is_not_a_direct_status_change() {
        assert!(!Available.can_set_directly(Listed));
        assert!(Available.can_transition_to(Listed));
        assert!(Listed.can_set_directly(Available));
        assert!(Listed.can_set_directly(Sold));
        assert!(Available.can_set_directly(Spoiled));
        assert!(Available.can_set_directly(Available));
    }

    #[test]
    fn sold_batches_are_frozen_and_listed_ones_kept() {
        assert!(!Sold.is_editable());
        for status in [Available, Listed, Spoiled] {
            assert!(status.is_editable());
        }
        assert!(!Listed.is_deletable());
        assert!(!Sold.is_deletable());
        assert!(Available.is_deletable());
        assert!(Spoiled.is_deletable());
    }

    #[test]
    fn terminal_states_stay_put() {
        for next in [Available, Listed, Spoiled] {
            assert!(!Sold.can_transition_to(next));
        }
        for next in [Available, Listed, Sold] {
            assert!(!Spoiled.can_transition_to(next));
        }
        assert!(!Available.can_transition_to(Sold));
    }

    #[test]
    fn same_status_is_a_no_op() {
        for status in [Available, Listed, Sold, Spoiled] {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn unit_parses_lowercase() {
        let unit: BatchUnit = serde_json::from_str("\"crates\"").unwrap();
        assert_eq!(unit, BatchUnit::Crates);
        assert!(serde_json::from_str::<BatchUnit>("\"tonnes\"").is_err());
    }
}
