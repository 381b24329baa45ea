use serde::Serialize;
use serde_json::Value;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

pub const KIND_NEW_INQUIRY: &str = "new_inquiry";
pub const KIND_INQUIRY_RESPONSE: &str = "inquiry_response";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Json<Value>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub(crate) const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, data, is_read, created_at";
