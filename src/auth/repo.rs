use crate::auth::dto::Location;
use crate::auth::repo_types::{User, UserRole, USER_COLUMNS};
use anyhow::Context;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

/// Fields of a new account.
pub struct NewUser<'a> {
    pub user_type: UserRole,
    pub phone_number: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub location: Option<&'a Location>,
}

impl User {
    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    /// Find a user by phone number.
    pub async fn find_by_phone(db: &PgPool, phone_number: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(phone_number)
            .fetch_optional(db)
            .await
            .context("find user by phone")?;
        Ok(user)
    }

    pub async fn phone_or_email_taken(
        db: &PgPool,
        phone_number: &str,
        email: Option<&str>,
    ) -> anyhow::Result<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                 WHERE phone_number = $1
                    OR ($2::text IS NOT NULL AND email = $2)
            )
            "#,
        )
        .bind(phone_number)
        .bind(email)
        .fetch_one(db)
        .await
        .context("check existing user")?;
        Ok(taken)
    }

    /// Create the account together with its empty farmer or buyer profile.
    pub async fn create_with_profile(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let mut tx = db.begin().await.context("begin tx")?;

        let sql = format!(
            r#"
            INSERT INTO users (user_type, phone_number, email, password_hash, name,
                               latitude, longitude, address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(new.user_type)
            .bind(new.phone_number)
            .bind(new.email)
            .bind(new.password_hash)
            .bind(new.name)
            .bind(new.location.map(|l| l.lat))
            .bind(new.location.map(|l| l.lng))
            .bind(new.location.map(|l| l.address.as_str()))
            .fetch_one(&mut *tx)
            .await
            .context("insert user")?;

        let profile_sql = match new.user_type {
            UserRole::Farmer => "INSERT INTO farmers (user_id, farm_name) VALUES ($1, $2)",
            UserRole::Buyer => "INSERT INTO buyers (user_id, business_name) VALUES ($1, $2)",
        };
        sqlx::query(profile_sql)
            .bind(user.id)
            .bind(new.name)
            .execute(&mut *tx)
            .await
            .context("insert role profile")?;

        tx.commit().await.context("commit tx")?;
        Ok(user)
    }

    pub async fn store_otp(
        db: &PgPool,
        id: Uuid,
        otp_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET otp_hash = $2, otp_expires_at = $3, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(otp_hash)
        .bind(expires_at)
        .execute(db)
        .await
        .context("store otp")?;
        Ok(())
    }

    /// Marks the phone verified, clears the OTP and starts a session.
    pub async fn verify_and_login(db: &PgPool, id: Uuid, refresh_jti: Uuid) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            UPDATE users
               SET is_verified = TRUE, otp_hash = NULL, otp_expires_at = NULL,
                   refresh_jti = $2, last_login_at = now(), updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(refresh_jti)
            .fetch_one(db)
            .await
            .context("verify user")?;
        Ok(user)
    }

    pub async fn record_login(db: &PgPool, id: Uuid, refresh_jti: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET refresh_jti = $2, last_login_at = now(), updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(refresh_jti)
        .execute(db)
        .await
        .context("record login")?;
        Ok(())
    }

    /// Swaps the refresh token id only if `current` is still the stored one.
    pub async fn rotate_refresh(
        db: &PgPool,
        id: Uuid,
        current: Uuid,
        next: Uuid,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_jti = $3, updated_at = now()
             WHERE id = $1 AND refresh_jti = $2
            "#,
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .execute(db)
        .await
        .context("rotate refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn revoke_refresh(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET refresh_jti = NULL, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("revoke refresh token")?;
        Ok(())
    }

    /// Sets a new password, consumes the OTP and ends every session.
    pub async fn reset_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, otp_hash = NULL, otp_expires_at = NULL,
                   refresh_jti = NULL, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await
        .context("reset password")?;
        Ok(())
    }
}
