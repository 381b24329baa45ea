use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, MessageResponse, PhoneRequest, PublicUser, RefreshRequest,
            RegisterRequest, RegisterResponse, ResetPasswordRequest, TokenPair, VerifyOtpRequest,
        },
        extractors::VerifiedUser,
        password::{generate_otp, hash_password, password_problems, verify_password},
        repo::NewUser,
        repo_types::User,
        services::{is_valid_email, is_valid_phone, AuthUser, JwtKeys},
    },
    error::internal,
    sms,
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

const FORGOT_PASSWORD_REPLY: &str =
    "If an account with this phone number exists, you will receive an OTP shortly.";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend-otp", post(resend_otp))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/refresh-token", post(refresh_token))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/profile", get(get_profile))
        .route("/auth/verified-profile", get(get_verified_profile))
}

/// Generates an OTP, stores its hash and returns the plain code.
async fn issue_otp(state: &AppState, user_id: Uuid) -> anyhow::Result<String> {
    let otp = generate_otp();
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(state.config.otp_ttl_minutes);
    User::store_otp(&state.db, user_id, &hash_password(&otp)?, expires_at).await?;
    Ok(otp)
}

async fn start_session(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    let keys = JwtKeys::from_ref(state);
    let jti = Uuid::new_v4();
    User::record_login(&state.db, user.id, jti)
        .await
        .map_err(internal)?;
    keys.issue_pair(user, jti).map_err(internal)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    payload.phone_number = payload.phone_number.trim().to_string();
    payload.name = payload.name.trim().to_string();
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    if !is_valid_phone(&payload.phone_number) {
        warn!(phone = %payload.phone_number, "invalid phone number");
        return Err((StatusCode::BAD_REQUEST, "Invalid phone number".into()));
    }
    if let Some(email) = &email {
        if !is_valid_email(email) {
            warn!(%email, "invalid email");
            return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
        }
    }
    let name_len = payload.name.chars().count();
    if !(2..=100).contains(&name_len) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Name must be between 2 and 100 characters".into(),
        ));
    }
    if let Some(location) = &payload.location {
        if !location.point().is_valid() {
            return Err((StatusCode::BAD_REQUEST, "Invalid location".into()));
        }
    }
    let problems = password_problems(&payload.password);
    if !problems.is_empty() {
        warn!("password does not meet requirements");
        return Err((StatusCode::BAD_REQUEST, problems.join("; ")));
    }

    let taken = User::phone_or_email_taken(&state.db, &payload.phone_number, email.as_deref())
        .await
        .map_err(internal)?;
    if taken {
        warn!(phone = %payload.phone_number, "phone or email already registered");
        return Err((
            StatusCode::CONFLICT,
            "User already exists with this phone number or email".into(),
        ));
    }

    let hash = hash_password(&payload.password).map_err(internal)?;
    let user = User::create_with_profile(
        &state.db,
        NewUser {
            user_type: payload.user_type,
            phone_number: &payload.phone_number,
            email: email.as_deref(),
            password_hash: &hash,
            name: &payload.name,
            location: payload.location.as_ref(),
        },
    )
    .await
    .map_err(internal)?;

    let otp = issue_otp(&state, user.id).await.map_err(internal)?;
    let message = sms::otp_message(&otp, state.config.otp_ttl_minutes);
    if let Err(e) = sms::deliver(state.sms.as_ref(), &user.phone_number, &message).await {
        // registration still succeeds; the user can ask for a resend
        error!(error = %e, user_id = %user.id, "failed to send OTP");
    }

    info!(user_id = %user.id, role = ?user.user_type, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            phone_number: user.phone_number,
            user_type: user.user_type,
            is_verified: user.is_verified,
            otp: state.config.expose_otp.then_some(otp),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = User::find_by_phone(&state.db, payload.phone_number.trim())
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    if user.is_verified {
        return Err((StatusCode::BAD_REQUEST, "User is already verified".into()));
    }
    if !user.otp_matches(payload.otp.trim(), OffsetDateTime::now_utc()) {
        warn!(user_id = %user.id, "invalid or expired otp");
        return Err((StatusCode::BAD_REQUEST, "Invalid or expired OTP".into()));
    }

    let jti = Uuid::new_v4();
    let user = User::verify_and_login(&state.db, user.id, jti)
        .await
        .map_err(internal)?;
    let tokens = JwtKeys::from_ref(&state)
        .issue_pair(&user, jti)
        .map_err(internal)?;

    info!(user_id = %user.id, "phone number verified");
    Ok(Json(AuthResponse {
        user: PublicUser::from(user),
        tokens,
    }))
}

#[instrument(skip(state, payload))]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<PhoneRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let user = User::find_by_phone(&state.db, payload.phone_number.trim())
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    if user.is_verified {
        return Err((StatusCode::BAD_REQUEST, "User is already verified".into()));
    }

    let otp = issue_otp(&state, user.id).await.map_err(internal)?;
    let message = sms::otp_message(&otp, state.config.otp_ttl_minutes);
    sms::deliver(state.sms.as_ref(), &user.phone_number, &message)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "failed to resend OTP");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send OTP. Please try again later.".to_string(),
            )
        })?;

    Ok(Json(MessageResponse { message: "OTP sent successfully" }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<PhoneRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let Some(user) = User::find_by_phone(&state.db, payload.phone_number.trim())
        .await
        .map_err(internal)?
    else {
        // same answer either way so the endpoint cannot probe for accounts
        return Ok(Json(MessageResponse { message: FORGOT_PASSWORD_REPLY }));
    };

    let otp = issue_otp(&state, user.id).await.map_err(internal)?;
    if let Err(e) = sms::deliver(
        state.sms.as_ref(),
        &user.phone_number,
        &sms::password_reset_message(&otp),
    )
    .await
    {
        error!(error = %e, user_id = %user.id, "failed to send password reset OTP");
    }

    Ok(Json(MessageResponse { message: FORGOT_PASSWORD_REPLY }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let problems = password_problems(&payload.new_password);
    if !problems.is_empty() {
        return Err((StatusCode::BAD_REQUEST, problems.join("; ")));
    }

    let user = User::find_by_phone(&state.db, payload.phone_number.trim())
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    if !user.otp_matches(payload.otp.trim(), OffsetDateTime::now_utc()) {
        warn!(user_id = %user.id, "invalid or expired reset otp");
        return Err((StatusCode::BAD_REQUEST, "Invalid or expired OTP".into()));
    }

    let hash = hash_password(&payload.new_password).map_err(internal)?;
    User::reset_password(&state.db, user.id, &hash)
        .await
        .map_err(internal)?;

    info!(user_id = %user.id, "password reset");
    Ok(Json(MessageResponse { message: "Password reset successfully" }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let phone = payload.phone_number.trim();

    let user = match User::find_by_phone(&state.db, phone).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(%phone, "login unknown phone number");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_phone failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into()));
        }
    };

    let ok = match verify_password(&payload.password, &user.password_hash) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "verify_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into()));
        }
    };

    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let tokens = start_session(&state, &user).await?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        user: PublicUser::from(user),
        tokens,
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
    })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string()))?;

    let next = Uuid::new_v4();
    let rotated = User::rotate_refresh(&state.db, user.id, claims.jti, next)
        .await
        .map_err(internal)?;
    if !rotated {
        warn!(user_id = %user.id, "stale or revoked refresh token");
        return Err((StatusCode::UNAUTHORIZED, "Invalid refresh token".into()));
    }

    let tokens = keys.issue_pair(&user, next).map_err(internal)?;
    Ok(Json(tokens))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<MessageResponse>> {
    User::revoke_refresh(&state.db, user.id)
        .await
        .map_err(internal)?;
    info!(user_id = %user.id, "user logged out");
    Ok(Json(MessageResponse { message: "Logged out successfully" }))
}

async fn load_public_user(state: &AppState, user_id: Uuid) -> ApiResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            error!(%user_id, "user not found");
            (StatusCode::NOT_FOUND, "User not found".to_string())
        })?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state))]
pub async fn get_profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<PublicUser>> {
    load_public_user(&state, user.id).await
}

#[instrument(skip(state))]
pub async fn get_verified_profile(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
) -> ApiResult<Json<PublicUser>> {
    load_public_user(&state, user.id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::UserRole;

    #[test]
    fn public_user_serialization() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            user_type: UserRole::Buyer,
            phone_number: "+254710996532".into(),
            email: Some("buyer@market.co.ke".into()),
            password_hash: "secret-hash".into(),
            name: "Achieng".into(),
            latitude: Some(-1.29),
            longitude: Some(36.82),
            address: Some("Nairobi".into()),
            is_verified: true,
            otp_hash: Some("otp-hash".into()),
            otp_expires_at: None,
            refresh_jti: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(PublicUser::from(user)).unwrap();
        assert_eq!(json["user_type"], "buyer");
        assert_eq!(json["location"]["address"], "Nairobi");
        let text = json.to_string();
        assert!(!text.contains("secret-hash"));
        assert!(!text.contains("otp-hash"));
    }

    #[test]
    fn register_request_accepts_optional_fields() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"user_type":"farmer","phone_number":"0710996532","password":"Harvest#2026","name":"Kamau"}"#,
        )
        .unwrap();
        assert_eq!(req.user_type, UserRole::Farmer);
        assert!(req.email.is_none());
        assert!(req.location.is_none());
    }

    #[test]
    fn refresh_request_accepts_camel_case() {
        let req: RefreshRequest = serde_json::from_str(r#"{"refreshToken":"abc"}"#).unwrap();
        assert_eq!(req.refresh_token, "abc");
    }
}
