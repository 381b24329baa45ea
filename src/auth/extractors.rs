use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;
use uuid::Uuid;

use super::dto::JwtKeys;
use super::repo_types::UserRole;
use super::services::AuthUser;

/// Caller holding a farmer access token.
pub struct FarmerUser(pub Uuid);

/// Caller holding a buyer access token.
pub struct BuyerUser(pub Uuid);

/// Caller whose phone number has been verified.
pub struct VerifiedUser(pub AuthUser);

fn require_role(user: AuthUser, role: UserRole) -> Result<Uuid, (StatusCode, String)> {
    if user.role != role {
        warn!(user_id = %user.id, have = ?user.role, want = ?role, "role check failed");
        return Err((
            StatusCode::FORBIDDEN,
            format!("Access denied. Required role: {}", role_name(role)),
        ));
    }
    Ok(user.id)
}

fn role_name(role: UserRole) -> &'static str {
    match role {
        UserRole::Farmer => "farmer",
        UserRole::Buyer => "buyer",
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for FarmerUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_role(user, UserRole::Farmer).map(FarmerUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BuyerUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_role(user, UserRole::Buyer).map(BuyerUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.verified {
            return Err((
                StatusCode::FORBIDDEN,
                "Account verification is required to access this resource".into(),
            ));
        }
        Ok(VerifiedUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: UserRole) -> AuthUser {
        AuthUser { id: Uuid::new_v4(), role, verified: true }
    }

    #[test]
    fn matching_role_passes() {
        let user = caller(UserRole::Farmer);
        assert_eq!(require_role(user, UserRole::Farmer).unwrap(), user.id);
    }

    #[test]
    fn other_role_is_forbidden() {
        let (status, msg) = require_role(caller(UserRole::Buyer), UserRole::Farmer).unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(msg.contains("farmer"));
    }
}
