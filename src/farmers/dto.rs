use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::dto::PublicUser;
use crate::batches::dto::BatchView;
use crate::error::MarketError;
use crate::farmers::repo_types::{FarmerProfile, MonthlyTotal, StatusTotal};

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFarmerRequest {
    pub farm_name: Option<String>,
    pub farm_size: Option<f64>,
    pub primary_crops: Option<Vec<String>>,
    pub certification_level: Option<String>,
}

impl UpdateFarmerRequest {
    pub fn validate(&mut self) -> Result<(), MarketError> {
        if let Some(name) = self.farm_name.as_mut() {
            *name = name.trim().to_string();
            if !(2..=100).contains(&name.chars().count()) {
                return Err(MarketError::InvalidInput(
                    "Farm name must be between 2 and 100 characters".into(),
                ));
            }
        }
        if let Some(size) = self.farm_size {
            if !size.is_finite() || size <= 0.0 {
                return Err(MarketError::InvalidInput(
                    "farm_size must be greater than zero".into(),
                ));
            }
        }
        if let Some(crops) = self.primary_crops.as_mut() {
            crops.iter_mut().for_each(|c| *c = c.trim().to_string());
            crops.retain(|c| !c.is_empty());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RateFarmerRequest {
    pub farmer_id: Uuid,
    pub rating: u8,
}

impl RateFarmerRequest {
    pub fn validate(&self) -> Result<(), MarketError> {
        if !(1..=5).contains(&self.rating) {
            return Err(MarketError::InvalidInput("Rating must be between 1 and 5".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchStats {
    pub total_batches: i64,
    pub total_quantity: f64,
    pub by_status: Vec<StatusTotal>,
}

impl From<Vec<StatusTotal>> for BatchStats {
    fn from(by_status: Vec<StatusTotal>) -> Self {
        Self {
            total_batches: by_status.iter().map(|s| s.batches).sum(),
            total_quantity: by_status.iter().map(|s| s.quantity).sum(),
            by_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FarmerProfileResponse {
    pub user: PublicUser,
    pub profile: FarmerProfile,
    pub stats: BatchStats,
}

#[derive(Debug, Serialize)]
pub struct FarmerDashboard {
    pub recent_batches: Vec<BatchView>,
    pub stats: BatchStats,
    pub monthly_harvest: Vec<MonthlyTotal>,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub farmer_id: Uuid,
    pub rating: f64,
    pub rating_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batches::repo_types::BatchStatus;

    #[test]
    fn stats_sum_over_statuses() {
        let stats = BatchStats::from(vec![
            StatusTotal { status: BatchStatus::Available, batches: 2, quantity: 120.0 },
            StatusTotal { status: BatchStatus::Sold, batches: 1, quantity: 30.5 },
        ]);
        assert_eq!(stats.total_batches, 3);
        assert_eq!(stats.total_quantity, 150.5);
    }

    #[test]
    fn rating_is_bounded() {
        let id = Uuid::new_v4();
        assert!(RateFarmerRequest { farmer_id: id, rating: 0 }.validate().is_err());
        assert!(RateFarmerRequest { farmer_id: id, rating: 6 }.validate().is_err());
        assert!(RateFarmerRequest { farmer_id: id, rating: 5 }.validate().is_ok());
    }

    #[test]
    fn update_trims_crop_names() {
        let mut req = UpdateFarmerRequest {
            farm_name: Some("  Kamau Farm ".into()),
            primary_crops: Some(vec![" Maize".into(), "  ".into()]),
            ..Default::default()
        };
        req.validate().unwrap();
        assert_eq!(req.farm_name.as_deref(), Some("Kamau Farm"));
        assert_eq!(req.primary_crops.unwrap(), vec!["Maize".to_string()]);
    }

    #[test]
    fn update_rejects_non_positive_size() {
        let mut req = UpdateFarmerRequest { farm_size: Some(0.0), ..Default::default() };
        assert!(matches!(req.validate(), Err(MarketError::InvalidInput(_))));
    }
}
