use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MarketError;
use crate::geo::GeoPoint;
use crate::marketplace::filter::{ListingFilter, Near, Page, SortKey, DEFAULT_LIMIT};
use crate::marketplace::repo_types::ListingView;

pub const DEFAULT_MAX_RISK: u8 = 3;
pub const DEFAULT_RADIUS_KM: f64 = 50.0;

/// Query string of `GET /marketplace/listings`.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub crop_category: Option<String>,
    pub crop_name: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_quantity: Option<f64>,
    /// `"lat,lng"`
    pub location: Option<String>,
    pub radius: Option<f64>,
    #[serde(alias = "spoilage_risk_max")]
    pub max_risk: Option<i64>,
    pub sort: Option<SortKey>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}

impl ListingQuery {
    /// Normalised filter and page. Blank strings count as absent.
    pub fn into_filter(self) -> Result<(ListingFilter, Page), MarketError> {
        let near = match non_empty(self.location) {
            None => None,
            Some(raw) => {
                let center = GeoPoint::parse(&raw).ok_or_else(|| {
                    MarketError::InvalidFilter("location must be \"lat,lng\" within range".into())
                })?;
                Some(Near {
                    center,
                    radius_km: self.radius.unwrap_or(DEFAULT_RADIUS_KM),
                })
            }
        };
        let max_risk = match self.max_risk {
            None => DEFAULT_MAX_RISK,
            Some(v) => u8::try_from(v)
                .map_err(|_| MarketError::InvalidFilter("max_risk must be between 1 and 5".into()))?,
        };

        let filter = ListingFilter {
            crop_category: non_empty(self.crop_category),
            crop_name: non_empty(self.crop_name),
            min_price: self.min_price,
            max_price: self.max_price,
            min_quantity: self.min_quantity,
            near,
            max_risk: Some(max_risk),
            sort: self.sort.unwrap_or_default(),
        };
        filter.validate()?;
        let page = Page::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(i64::from(DEFAULT_LIMIT)),
        )?;
        Ok((filter, page))
    }
}

fn default_currency() -> String {
    "KES".into()
}

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub batch_id: Uuid,
    pub price_per_unit: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn check_price(price: f64) -> Result<(), MarketError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(MarketError::InvalidInput("Price per unit must be greater than zero".into()));
    }
    Ok(())
}

impl CreateListingRequest {
    pub fn validate(&mut self) -> Result<(), MarketError> {
        check_price(self.price_per_unit)?;
        self.currency = self.currency.trim().to_uppercase();
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MarketError::InvalidInput("Currency must be a 3 letter code".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateListingRequest {
    pub is_active: Option<bool>,
    pub price_per_unit: Option<f64>,
}

impl UpdateListingRequest {
    pub fn validate(&self) -> Result<(), MarketError> {
        if let Some(price) = self.price_per_unit {
            check_price(price)?;
        }
        Ok(())
    }
}

/// Single listing with its risk; the risk is absent when the crop data is unusable.
#[derive(Debug, Serialize)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: ListingView,
    pub spoilage_risk_level: Option<u8>,
}
