use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inquiry_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InquiryStatus {
    Pending,
    Responded,
    Accepted,
    Rejected,
    Closed,
}

impl InquiryStatus {
    /// Accepted, rejected and closed inquiries take no further responses.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Closed)
    }

    /// Statuses a farmer may set when responding.
    pub fn is_response(self) -> bool {
        self != Self::Pending
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Inquiry {
    pub id: i64,
    pub buyer_id: Uuid,
    pub listing_id: i64,
    pub message: String,
    pub quantity_interested: Option<f64>,
    pub proposed_price: Option<f64>,
    pub status: InquiryStatus,
    pub response_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub responded_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub(crate) const INQUIRY_COLUMNS: &str = "i.id, i.buyer_id, i.listing_id, i.message, \
     i.quantity_interested, i.proposed_price, i.status, i.response_message, i.responded_at, \
     i.created_at";

/// Inquiry with the parties and the listing it is about.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InquiryRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub inquiry: Inquiry,
    pub buyer_name: String,
    pub buyer_phone_number: String,
    pub farmer_id: Uuid,
    pub farmer_name: String,
    pub crop_name: String,
    pub batch_code: String,
    pub price_per_unit: f64,
    pub currency: String,
}

pub(crate) const INQUIRY_ROW_SELECT: &str = r#"
    SELECT i.id, i.buyer_id, i.listing_id, i.message, i.quantity_interested, i.proposed_price,
           i.status, i.response_message, i.responded_at, i.created_at,
           bu.name AS buyer_name, bu.phone_number AS buyer_phone_number,
           fu.id AS farmer_id, fu.name AS farmer_name,
           c.name AS crop_name, b.batch_code, l.price_per_unit, l.currency
      FROM inquiries i
      JOIN users bu ON bu.id = i.buyer_id
      JOIN listings l ON l.id = i.listing_id
      JOIN harvest_batches b ON b.id = l.batch_id
      JOIN crop_profiles c ON c.id = b.crop_id
      JOIN users fu ON fu.id = b.farmer_id
"#;

/// Farmer and crop behind an active listing.
#[derive(Debug, Clone, FromRow)]
pub struct ListingOwner {
    pub farmer_id: Uuid,
    pub crop_name: String,
}
