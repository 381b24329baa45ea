use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{dto::PublicUser, extractors::BuyerUser, repo_types::User},
    buyers::{
        dto::{BuyerDashboard, BuyerProfileResponse, UpdateBuyerRequest},
        repo::RECENT_INQUIRIES,
        repo_types::BuyerProfile,
    },
    error::{internal, MarketError},
    inquiries::{repo::Party, repo_types::Inquiry},
    marketplace::repo_types::Listing,
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/buyer/profile", get(get_profile).put(update_profile))
        .route("/buyer/dashboard", get(dashboard))
}

async fn load_user(state: &AppState, buyer_id: Uuid) -> ApiResult<PublicUser> {
    let user = User::find_by_id(&state.db, buyer_id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("User"))?;
    Ok(user.into())
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    BuyerUser(buyer_id): BuyerUser,
) -> ApiResult<Json<BuyerProfileResponse>> {
    let user = load_user(&state, buyer_id).await?;
    let profile = BuyerProfile::find(&state.db, buyer_id)
        .await
        .map_err(internal)?;
    Ok(Json(BuyerProfileResponse { user, profile }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    BuyerUser(buyer_id): BuyerUser,
    Json(mut payload): Json<UpdateBuyerRequest>,
) -> ApiResult<Json<BuyerProfileResponse>> {
    payload.validate()?;
    let user = load_user(&state, buyer_id).await?;
    let profile = BuyerProfile::upsert(&state.db, buyer_id, &payload)
        .await
        .map_err(internal)?;
    info!(%buyer_id, "buyer profile saved");
    Ok(Json(BuyerProfileResponse { user, profile: Some(profile) }))
}

#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    BuyerUser(buyer_id): BuyerUser,
) -> ApiResult<Json<BuyerDashboard>> {
    let ((total_inquiries, pending_inquiries), active_listings, (recent_inquiries, _)) = tokio::try_join!(
        Inquiry::buyer_counts(&state.db, buyer_id),
        Listing::count_active(&state.db),
        Inquiry::page_for(&state.db, Party::Buyer(buyer_id), None, RECENT_INQUIRIES, 0),
    )
    .map_err(internal)?;

    Ok(Json(BuyerDashboard {
        total_inquiries,
        pending_inquiries,
        active_listings,
        recent_inquiries,
    }))
}
