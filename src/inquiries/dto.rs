use serde::Deserialize;

use crate::error::MarketError;
use crate::inquiries::repo_types::InquiryStatus;
use crate::marketplace::filter::{Page, DEFAULT_LIMIT};

#[derive(Debug, Deserialize)]
pub struct CreateInquiryRequest {
    pub listing_id: i64,
    pub message: String,
    pub quantity_interested: Option<f64>,
    pub proposed_price: Option<f64>,
}

fn positive(name: &str, v: Option<f64>) -> Result<(), MarketError> {
    match v {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(MarketError::InvalidInput(format!(
            "{name} must be greater than zero"
        ))),
        _ => Ok(()),
    }
}

impl CreateInquiryRequest {
    pub fn validate(&mut self) -> Result<(), MarketError> {
        self.message = self.message.trim().to_string();
        let len = self.message.chars().count();
        if !(10..=500).contains(&len) {
            return Err(MarketError::InvalidInput(
                "Message must be between 10 and 500 characters".into(),
            ));
        }
        positive("quantity_interested", self.quantity_interested)?;
        positive("proposed_price", self.proposed_price)
    }
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response_message: String,
    pub status: InquiryStatus,
}

impl RespondRequest {
    pub fn validate(&mut self) -> Result<(), MarketError> {
        self.response_message = self.response_message.trim().to_string();
        let len = self.response_message.chars().count();
        if !(1..=1000).contains(&len) {
            return Err(MarketError::InvalidInput(
                "Response must be between 1 and 1000 characters".into(),
            ));
        }
        if !self.status.is_response() {
            return Err(MarketError::InvalidInput(
                "Status must be responded, accepted, rejected or closed".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InquiryQuery {
    pub status: Option<InquiryStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl InquiryQuery {
    pub fn page(&self) -> Result<Page, MarketError> {
        Page::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(i64::from(DEFAULT_LIMIT)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inquiry(message: &str) -> CreateInquiryRequest {
        CreateInquiryRequest {
            listing_id: 1,
            message: message.into(),
            quantity_interested: Some(50.0),
            proposed_price: None,
        }
    }

    #[test]
    fn message_length_is_bounded() {
        assert!(inquiry("Is this still available?").validate().is_ok());
        assert!(matches!(inquiry("  short   ").validate(), Err(MarketError::InvalidInput(_))));
        assert!(inquiry(&"x".repeat(501)).validate().is_err());
        assert!(inquiry(&"x".repeat(500)).validate().is_ok());
    }

    #[test]
    fn offers_must_be_positive() {
        let mut req = inquiry("Can you deliver to Thika?");
        req.proposed_price = Some(-5.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn respond_rejects_pending() {
        let mut req = RespondRequest { response_message: "Noted".into(), status: InquiryStatus::Pending };
        assert!(req.validate().is_err());
        req.status = InquiryStatus::Accepted;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn query_defaults_to_first_page() {
        let page = InquiryQuery::default().page().unwrap();
        assert_eq!((page.page, page.limit), (1, 20));
    }
}
