use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which side of the marketplace an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Farmer,
    Buyer,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub user_type: UserRole,
    pub phone_number: String,
    pub email: Option<String>,
    pub password_hash: String,               // Argon2 hash
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub is_verified: bool,
    pub otp_hash: Option<String>,            // Argon2 hash of the pending OTP
    pub otp_expires_at: Option<OffsetDateTime>,
    pub refresh_jti: Option<Uuid>,           // id of the only valid refresh token
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub(crate) const USER_COLUMNS: &str = "id, user_type, phone_number, email, password_hash, name, \
     latitude, longitude, address, is_verified, otp_hash, otp_expires_at, refresh_jti, \
     last_login_at, created_at, updated_at";

impl User {
    /// True when `otp` matches the pending code and it has not expired.
    pub fn otp_matches(&self, otp: &str, now: OffsetDateTime) -> bool {
        let (Some(hash), Some(expires_at)) = (&self.otp_hash, self.otp_expires_at) else {
            return false;
        };
        if now > expires_at {
            return false;
        }
        crate::auth::password::verify_password(otp, hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use time::Duration;

    fn user_with_otp(otp: Option<&str>, expires_in: Duration) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            user_type: UserRole::Farmer,
            phone_number: "+254710996532".into(),
            email: None,
            password_hash: String::new(),
            name: "Otieno".into(),
            latitude: None,
            longitude: None,
            address: None,
            is_verified: false,
            otp_hash: otp.map(|o| hash_password(o).unwrap()),
            otp_expires_at: otp.map(|_| now + expires_in),
            refresh_jti: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn accepts_pending_otp() {
        let user = user_with_otp(Some("482913"), Duration::minutes(10));
        assert!(user.otp_matches("482913", OffsetDateTime::now_utc()));
        assert!(!user.otp_matches("000000", OffsetDateTime::now_utc()));
    }

    #[test]
    fn rejects_expired_or_missing_otp() {
        let expired = user_with_otp(Some("482913"), Duration::minutes(-1));
        assert!(!expired.otp_matches("482913", OffsetDateTime::now_utc()));
        let none = user_with_otp(None, Duration::minutes(10));
        assert!(!none.otp_matches("482913", OffsetDateTime::now_utc()));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Farmer).unwrap(), "\"farmer\"");
        let parsed: UserRole = serde_json::from_str("\"buyer\"").unwrap();
        assert_eq!(parsed, UserRole::Buyer);
    }
}
