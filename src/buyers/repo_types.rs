use serde::Serialize;
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BuyerProfile {
    pub user_id: Uuid,
    pub business_name: String,
    pub business_type: Option<String>,
    pub buying_capacity: Option<f64>,
    pub preferred_crops: Json<Vec<String>>,
    pub rating: Option<f64>,
}

pub(crate) const BUYER_COLUMNS: &str =
    "user_id, business_name, business_type, buying_capacity, preferred_crops, rating";
