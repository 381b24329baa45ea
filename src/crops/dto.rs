use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crops::repo_types::CropProfile;
use crate::error::MarketError;

#[derive(Debug, Serialize)]
pub struct CropCatalog {
    pub crops: Vec<CropProfile>,
    pub grouped: BTreeMap<String, Vec<CropProfile>>,
}

impl From<Vec<CropProfile>> for CropCatalog {
    fn from(crops: Vec<CropProfile>) -> Self {
        let mut grouped: BTreeMap<String, Vec<CropProfile>> = BTreeMap::new();
        for crop in &crops {
            grouped
                .entry(crop.category.clone())
                .or_default()
                .push(crop.clone());
        }
        Self { crops, grouped }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCropRequest {
    pub name: String,
    pub category: String,
    pub spoilage_sensitivity: i32,
    #[serde(alias = "typical_shelf_life_days")]
    pub shelf_life_days: i32,
    #[serde(alias = "storage_recommendations")]
    pub storage_hints: Option<Value>,
}

impl CreateCropRequest {
    pub fn validate(&self) -> Result<(), MarketError> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > 50 {
            return Err(MarketError::InvalidInput(
                "Crop name must be between 1 and 50 characters".into(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(MarketError::InvalidInput("Category is required".into()));
        }
        if !(1..=10).contains(&self.spoilage_sensitivity) {
            return Err(MarketError::InvalidInput(
                "Spoilage sensitivity must be between 1 and 10".into(),
            ));
        }
        if self.shelf_life_days <= 0 {
            return Err(MarketError::InvalidInput(
                "Shelf life must be a positive number of days".into(),
            ));
        }
        if let Some(hints) = &self.storage_hints {
            if !hints.is_object() {
                return Err(MarketError::InvalidInput(
                    "Storage hints must be a JSON object".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::types::Json;

    fn request(sensitivity: i32, shelf: i32) -> CreateCropRequest {
        CreateCropRequest {
            name: "Kale".into(),
            category: "Vegetables".into(),
            spoilage_sensitivity: sensitivity,
            shelf_life_days: shelf,
            storage_hints: None,
        }
    }

    #[test]
    fn accepts_reasonable_crop() {
        assert!(request(7, 4).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(request(0, 4).validate(), Err(MarketError::InvalidInput(_))));
        assert!(matches!(request(11, 4).validate(), Err(MarketError::InvalidInput(_))));
        assert!(matches!(request(5, 0).validate(), Err(MarketError::InvalidInput(_))));
    }

    #[test]
    fn accepts_legacy_field_names() {
        let req: CreateCropRequest = serde_json::from_value(json!({
            "name": "Kale",
            "category": "Vegetables",
            "spoilage_sensitivity": 7,
            "typical_shelf_life_days": 4,
            "storage_recommendations": { "temperature": "cold" }
        }))
        .unwrap();
        assert_eq!(req.shelf_life_days, 4);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn catalog_groups_by_category() {
        let crop = |id, name: &str, category: &str| CropProfile {
            id,
            name: name.into(),
            category: category.into(),
            spoilage_sensitivity: 5,
            shelf_life_days: 10,
            storage_hints: Json(json!({})),
        };
        let catalog = CropCatalog::from(vec![
            crop(1, "Bananas", "Fruits"),
            crop(2, "Mangoes", "Fruits"),
            crop(3, "Maize", "Grains"),
        ]);
        assert_eq!(catalog.crops.len(), 3);
        assert_eq!(catalog.grouped["Fruits"].len(), 2);
        assert_eq!(catalog.grouped["Grains"][0].name, "Maize");
    }
}
