use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{info, instrument};

use crate::{
    auth::extractors::FarmerUser,
    crops::{
        dto::{CreateCropRequest, CropCatalog},
        repo_types::CropProfile,
    },
    error::internal,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/crops/templates", get(list_crops).post(create_crop))
}

#[instrument(skip(state))]
pub async fn list_crops(
    State(state): State<AppState>,
) -> Result<Json<CropCatalog>, (StatusCode, String)> {
    let crops = CropProfile::list(&state.db).await.map_err(internal)?;
    Ok(Json(CropCatalog::from(crops)))
}

#[instrument(skip(state, payload))]
pub async fn create_crop(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Json(payload): Json<CreateCropRequest>,
) -> Result<(StatusCode, Json<CropProfile>), (StatusCode, String)> {
    payload.validate()?;
    let crop = CropProfile::create(&state.db, &payload).await?;
    info!(%farmer_id, crop_id = crop.id, name = %crop.name, "crop profile created");
    Ok((StatusCode::CREATED, Json(crop)))
}
