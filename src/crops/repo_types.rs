use serde::Serialize;
use serde_json::Value;
use sqlx::{types::Json, FromRow};

/// Reference data describing how a crop type keeps after harvest.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CropProfile {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub spoilage_sensitivity: i32, // 1..=10
    pub shelf_life_days: i32,
    pub storage_hints: Json<Value>,
}

pub(crate) const CROP_COLUMNS: &str =
    "id, name, category, spoilage_sensitivity, shelf_life_days, storage_hints";

/// Default crop set: name, category, sensitivity, shelf life, temperature, humidity.
pub(crate) const DEFAULT_CROPS: [(&str, &str, i32, i32, &str, &str); 10] = [
    ("Tomatoes", "Vegetables", 8, 7, "cool", "moderate"),
    ("Spinach", "Vegetables", 9, 5, "cold", "high"),
    ("Onions", "Vegetables", 3, 30, "room", "low"),
    ("Carrots", "Vegetables", 4, 21, "cold", "high"),
    ("Bananas", "Fruits", 7, 6, "room", "moderate"),
    ("Mangoes", "Fruits", 6, 8, "room", "moderate"),
    ("Avocados", "Fruits", 5, 10, "room", "moderate"),
    ("Maize", "Grains", 2, 180, "room", "low"),
    ("Rice", "Grains", 1, 365, "room", "low"),
    ("Beans", "Legumes", 2, 90, "room", "low"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_crops_are_valid_profiles() {
        for (name, _, sensitivity, shelf, _, _) in DEFAULT_CROPS {
            assert!((1..=10).contains(&sensitivity), "{name}");
            assert!(shelf > 0, "{name}");
        }
        let mut names: Vec<_> = DEFAULT_CROPS.iter().map(|c| c.0).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), DEFAULT_CROPS.len());
    }
}
