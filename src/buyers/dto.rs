use serde::{Deserialize, Serialize};

use crate::auth::dto::PublicUser;
use crate::buyers::repo_types::BuyerProfile;
use crate::error::MarketError;
use crate::inquiries::repo_types::InquiryRow;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBuyerRequest {
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub buying_capacity: Option<f64>,
    pub preferred_crops: Option<Vec<String>>,
}

impl UpdateBuyerRequest {
    pub fn validate(&mut self) -> Result<(), MarketError> {
        if let Some(name) = self.business_name.as_mut() {
            *name = name.trim().to_string();
            if !(2..=100).contains(&name.chars().count()) {
                return Err(MarketError::InvalidInput(
                    "Business name must be between 2 and 100 characters".into(),
                ));
            }
        }
        if let Some(capacity) = self.buying_capacity {
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(MarketError::InvalidInput(
                    "buying_capacity must be greater than zero".into(),
                ));
            }
        }
        if let Some(crops) = self.preferred_crops.as_mut() {
            crops.iter_mut().for_each(|c| *c = c.trim().to_string());
            crops.retain(|c| !c.is_empty());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct BuyerProfileResponse {
    pub user: PublicUser,
    pub profile: Option<BuyerProfile>,
}

#[derive(Debug, Serialize)]
pub struct BuyerDashboard {
    pub total_inquiries: i64,
    pub pending_inquiries: i64,
    pub active_listings: i64,
    pub recent_inquiries: Vec<InquiryRow>,
}
