use serde::Serialize;
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use crate::batches::repo_types::BatchStatus;

/// Farm details kept next to the user account.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FarmerProfile {
    pub user_id: Uuid,
    pub farm_name: String,
    pub farm_size: Option<f64>,
    pub primary_crops: Json<Vec<String>>,
    pub certification_level: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: i32,
}

pub(crate) const FARMER_COLUMNS: &str =
    "user_id, farm_name, farm_size, primary_crops, certification_level, rating, rating_count";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusTotal {
    pub status: BatchStatus,
    pub batches: i64,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyTotal {
    /// `YYYY-MM` of the harvest date.
    pub month: String,
    pub batches: i64,
    pub quantity: f64,
}

/// Mean after adding one more rating to `count` earlier ones.
pub fn running_mean(current: Option<f64>, count: i32, rating: u8) -> f64 {
    let count = f64::from(count.max(0));
    let current = current.unwrap_or(0.0);
    (current * count + f64::from(rating)) / (count + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_rating_becomes_the_mean() {
        assert_eq!(running_mean(None, 0, 4), 4.0);
    }

    #[test]
    fn mean_accumulates() {
        let after_two = running_mean(Some(4.0), 1, 5);
        assert_eq!(after_two, 4.5);
        let after_three = running_mean(Some(after_two), 2, 3);
        assert!((after_three - 4.0).abs() < 1e-9);
    }
}
