use std::sync::Mutex;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone_number: &str, message: &str) -> anyhow::Result<()>;
}

/// Writes outgoing messages to the log instead of a provider.
#[derive(Clone, Default)]
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, phone_number: &str, message: &str) -> anyhow::Result<()> {
        info!(to = %phone_number, len = message.len(), "sms dispatched (log sender)");
        Ok(())
    }
}

/// Keeps every message in memory so tests can assert on it.
#[derive(Default)]
pub struct RecordingSmsSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send(&self, phone_number: &str, message: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("sms recorder mutex poisoned"))?
            .push((phone_number.to_string(), message.to_string()));
        Ok(())
    }
}

pub fn otp_message(otp: &str, ttl_minutes: i64) -> String {
    format!(
        "Your verification code is: {otp}. Valid for {ttl_minutes} minutes. Do not share this code with anyone."
    )
}

pub fn password_reset_message(otp: &str) -> String {
    format!("Your password reset code is: {otp}")
}

/// Normalises local Kenyan formats (`07…`, `2547…`, `7…`) to `+254…`.
pub fn format_phone_number(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if cleaned.starts_with('0') && cleaned.len() == 10 {
        format!("+254{}", &cleaned[1..])
    } else if cleaned.starts_with("254") && cleaned.len() == 12 {
        format!("+{cleaned}")
    } else if cleaned.len() == 9 && cleaned.starts_with(['7', '8', '9']) {
        format!("+254{cleaned}")
    } else {
        cleaned
    }
}

/// E.164 number on the Kenyan +254 plan.
pub fn is_deliverable(formatted: &str) -> bool {
    lazy_static! {
        static ref KENYA_RE: Regex = Regex::new(r"^\+254[7-9]\d{8}$").unwrap();
    }
    KENYA_RE.is_match(formatted)
}

/// Formats and validates the number, then hands the message to `sender`.
pub async fn deliver(sender: &dyn SmsSender, phone_number: &str, message: &str) -> anyhow::Result<()> {
    let formatted = format_phone_number(phone_number);
    if !is_deliverable(&formatted) {
        anyhow::bail!("invalid phone number format: {phone_number}");
    }
    sender.send(&formatted, message).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_kenyan_numbers() {
        assert_eq!(format_phone_number("0710996532"), "+254710996532");
        assert_eq!(format_phone_number("254710996532"), "+254710996532");
        assert_eq!(format_phone_number("710996532"), "+254710996532");
        assert_eq!(format_phone_number("+254 710-996-532"), "+254710996532");
    }

    #[test]
    fn validates_formatted_numbers() {
        assert!(is_deliverable("+254710996532"));
        assert!(!is_deliverable("+254610996532"));
        assert!(!is_deliverable("+14155550100"));
    }

    #[tokio::test]
    async fn deliver_sends_formatted_number() {
        let sender = RecordingSmsSender::default();
        deliver(&sender, "0710996532", "hello").await.unwrap();
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[("+254710996532".to_string(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn deliver_rejects_bad_numbers() {
        let sender = RecordingSmsSender::default();
        assert!(deliver(&sender, "12345", "hello").await.is_err());
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn otp_message_mentions_code_and_ttl() {
        let msg = otp_message("123456", 10);
        assert!(msg.contains("123456"));
        assert!(msg.contains("10 minutes"));
    }
}
