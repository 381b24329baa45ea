use serde::Serialize;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::batches::repo_types::{BatchStatus, BatchUnit};
use crate::geo::GeoPoint;
use crate::marketplace::filter::Candidate;
use crate::risk::{RiskInput, StorageConditions};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Listing {
    pub id: i64,
    pub batch_id: Uuid,
    pub price_per_unit: f64,
    pub currency: String,
    pub is_active: bool,
    pub view_count: i32,
    pub inquiry_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub listed_at: OffsetDateTime,
}

pub(crate) const LISTING_COLUMNS: &str = "l.id, l.batch_id, l.price_per_unit, l.currency, \
     l.is_active, l.view_count, l.inquiry_count, l.listed_at";

/// Listing joined with its batch, crop and farmer.
#[derive(Debug, Clone, FromRow)]
pub struct ListingRow {
    #[sqlx(flatten)]
    pub listing: Listing,
    pub batch_code: String,
    pub quantity: f64,
    pub unit: BatchUnit,
    pub harvest_date: OffsetDateTime,
    pub storage_conditions: Json<StorageConditions>,
    pub batch_status: BatchStatus,
    pub crop_id: i32,
    pub crop_name: String,
    pub crop_category: String,
    pub spoilage_sensitivity: i32,
    pub shelf_life_days: i32,
    pub farmer_id: Uuid,
    pub farmer_name: String,
    pub farmer_latitude: Option<f64>,
    pub farmer_longitude: Option<f64>,
    pub farmer_address: Option<String>,
}

pub(crate) const LISTING_ROW_SELECT: &str = r#"
    SELECT l.id, l.batch_id, l.price_per_unit, l.currency, l.is_active, l.view_count,
           l.inquiry_count, l.listed_at,
           b.batch_code, b.quantity, b.unit, b.harvest_date, b.storage_conditions,
           b.status AS batch_status,
           c.id AS crop_id, c.name AS crop_name, c.category AS crop_category,
           c.spoilage_sensitivity, c.shelf_life_days,
           u.id AS farmer_id, u.name AS farmer_name, u.latitude AS farmer_latitude,
           u.longitude AS farmer_longitude, u.address AS farmer_address
      FROM listings l
      JOIN harvest_batches b ON b.id = l.batch_id
      JOIN crop_profiles c ON c.id = b.crop_id
      JOIN users u ON u.id = b.farmer_id
"#;

/// Listing state plus the status of its batch, read under a row lock.
#[derive(Debug, Clone, FromRow)]
pub struct OwnedListing {
    pub id: i64,
    pub batch_id: Uuid,
    pub is_active: bool,
    pub batch_status: BatchStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub id: Uuid,
    pub batch_code: String,
    pub quantity: f64,
    pub unit: BatchUnit,
    #[serde(with = "time::serde::rfc3339")]
    pub harvest_date: OffsetDateTime,
    pub storage_conditions: StorageConditions,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CropInfo {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub spoilage_sensitivity: i32,
    pub shelf_life_days: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmerInfo {
    pub id: Uuid,
    pub name: String,
    pub location: Option<FarmerLocation>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FarmerLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: Listing,
    pub batch: BatchSummary,
    pub crop: CropInfo,
    pub farmer: FarmerInfo,
}

impl From<ListingRow> for ListingView {
    fn from(r: ListingRow) -> Self {
        let location = match (r.farmer_latitude, r.farmer_longitude) {
            (Some(lat), Some(lng)) => Some(FarmerLocation { lat, lng }),
            _ => None,
        };
        Self {
            batch: BatchSummary {
                id: r.listing.batch_id,
                batch_code: r.batch_code,
                quantity: r.quantity,
                unit: r.unit,
                harvest_date: r.harvest_date,
                storage_conditions: r.storage_conditions.0,
                status: r.batch_status,
            },
            crop: CropInfo {
                id: r.crop_id,
                name: r.crop_name,
                category: r.crop_category,
                spoilage_sensitivity: r.spoilage_sensitivity,
                shelf_life_days: r.shelf_life_days,
            },
            farmer: FarmerInfo {
                id: r.farmer_id,
                name: r.farmer_name,
                location,
                address: r.farmer_address,
            },
            listing: r.listing,
        }
    }
}

impl Candidate for ListingView {
    fn crop_name(&self) -> &str {
        &self.crop.name
    }

    fn crop_category(&self) -> &str {
        &self.crop.category
    }

    fn price_per_unit(&self) -> f64 {
        self.listing.price_per_unit
    }

    fn quantity(&self) -> f64 {
        self.batch.quantity
    }

    fn listed_at(&self) -> OffsetDateTime {
        self.listing.listed_at
    }

    fn farmer_location(&self) -> Option<GeoPoint> {
        self.farmer.location.map(|l| GeoPoint::new(l.lat, l.lng))
    }

    fn risk_input(&self) -> RiskInput {
        RiskInput {
            harvest_date: self.batch.harvest_date,
            shelf_life_days: self.crop.shelf_life_days,
            spoilage_sensitivity: self.crop.spoilage_sensitivity,
            storage: self.batch.storage_conditions,
        }
    }
}
