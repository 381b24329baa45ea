use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::PublicUser,
        extractors::{BuyerUser, FarmerUser},
        repo_types::User,
    },
    batches::dto::BatchView,
    error::{internal, MarketError},
    farmers::{
        dto::{
            FarmerDashboard, FarmerProfileResponse, RateFarmerRequest, RatingResponse,
            UpdateFarmerRequest,
        },
        repo_types::FarmerProfile,
    },
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/farmer/profile", get(get_profile).put(update_profile))
        .route("/farmer/dashboard", get(dashboard))
        .route("/farmer/rating", post(rate_farmer))
}

async fn profile_response(
    state: &AppState,
    farmer_id: Uuid,
    profile: FarmerProfile,
) -> ApiResult<Json<FarmerProfileResponse>> {
    let user = User::find_by_id(&state.db, farmer_id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("User"))?;
    let stats = FarmerProfile::status_totals(&state.db, farmer_id)
        .await
        .map_err(internal)?;
    Ok(Json(FarmerProfileResponse {
        user: PublicUser::from(user),
        profile,
        stats: stats.into(),
    }))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
) -> ApiResult<Json<FarmerProfileResponse>> {
    let profile = FarmerProfile::find(&state.db, farmer_id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Farmer profile"))?;
    profile_response(&state, farmer_id, profile).await
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Json(mut payload): Json<UpdateFarmerRequest>,
) -> ApiResult<Json<FarmerProfileResponse>> {
    payload.validate()?;
    let profile = FarmerProfile::update(&state.db, farmer_id, &payload)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Farmer profile"))?;
    info!(%farmer_id, "farmer profile updated");
    profile_response(&state, farmer_id, profile).await
}

#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
) -> ApiResult<Json<FarmerDashboard>> {
    let (recent, stats, monthly) = tokio::try_join!(
        FarmerProfile::recent_batches(&state.db, farmer_id),
        FarmerProfile::status_totals(&state.db, farmer_id),
        FarmerProfile::monthly_totals(&state.db, farmer_id),
    )
    .map_err(internal)?;

    let now = OffsetDateTime::now_utc();
    Ok(Json(FarmerDashboard {
        recent_batches: recent.into_iter().map(|row| BatchView::new(row, now)).collect(),
        stats: stats.into(),
        monthly_harvest: monthly,
    }))
}

#[instrument(skip(state, payload))]
pub async fn rate_farmer(
    State(state): State<AppState>,
    BuyerUser(buyer_id): BuyerUser,
    Json(payload): Json<RateFarmerRequest>,
) -> ApiResult<Json<RatingResponse>> {
    payload.validate()?;
    let (rating, rating_count) = FarmerProfile::add_rating(&state.db, payload.farmer_id, payload.rating)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Farmer"))?;

    info!(%buyer_id, farmer_id = %payload.farmer_id, rating = payload.rating, "farmer rated");
    Ok(Json(RatingResponse {
        farmer_id: payload.farmer_id,
        rating,
        rating_count,
    }))
}
