use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::FarmerUser,
    auth::dto::MessageResponse,
    batches::{
        dto::{
            BatchView, CreateBatchRequest, QrCodeResponse, StatusChanged, UpdateBatchRequest,
            UpdateStatusRequest,
        },
        ids::insert_with_fresh_code,
        repo::PgBatchSink,
        repo_types::{BatchStatus, BatchWithCrop, HarvestBatch},
    },
    crops::repo_types::CropProfile,
    error::{internal, MarketError},
    marketplace::{cache::invalidate_listings, repo_types::Listing},
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/farmer/batches", get(list_batches).post(create_batch))
        .route(
            "/farmer/batches/:id",
            get(get_batch).put(update_batch).delete(delete_batch),
        )
        .route("/farmer/batches/:id/qr-code", post(generate_qr_code))
        .route("/farmer/batches/:id/status", put(update_status))
}

async fn load_owned(state: &AppState, farmer_id: Uuid, id: Uuid) -> ApiResult<BatchWithCrop> {
    HarvestBatch::find_owned(&state.db, farmer_id, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| MarketError::NotFound("Batch").into())
}

#[instrument(skip(state))]
pub async fn list_batches(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
) -> ApiResult<Json<Vec<BatchView>>> {
    let rows = HarvestBatch::list_for_farmer(&state.db, farmer_id)
        .await
        .map_err(internal)?;
    let now = OffsetDateTime::now_utc();
    Ok(Json(rows.into_iter().map(|r| BatchView::new(r, now)).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_batch(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Json(payload): Json<CreateBatchRequest>,
) -> ApiResult<(StatusCode, Json<BatchView>)> {
    payload.validate()?;

    let crop = CropProfile::find(&state.db, payload.crop_id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Crop"))?;

    let sink = PgBatchSink { db: &state.db, farmer_id, req: &payload };
    let today = OffsetDateTime::now_utc().date();
    let (code, batch) = insert_with_fresh_code(&sink, &crop.name, today).await?;

    info!(%farmer_id, batch_id = %batch.id, %code, "harvest batch created");
    let row = BatchWithCrop {
        batch,
        crop_name: crop.name,
        crop_category: crop.category,
        spoilage_sensitivity: crop.spoilage_sensitivity,
        shelf_life_days: crop.shelf_life_days,
    };
    Ok((
        StatusCode::CREATED,
        Json(BatchView::new(row, OffsetDateTime::now_utc())),
    ))
}

#[instrument(skip(state))]
pub async fn get_batch(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BatchView>> {
    let row = load_owned(&state, farmer_id, id).await?;
    Ok(Json(BatchView::new(row, OffsetDateTime::now_utc())))
}

#[instrument(skip(state, payload))]
pub async fn update_batch(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBatchRequest>,
) -> ApiResult<Json<BatchView>> {
    payload.validate()?;
    let mut row = load_owned(&state, farmer_id, id).await?;
    if !row.batch.status.is_editable() {
        return Err(MarketError::Conflict("Cannot update a sold batch".into()).into());
    }

    // the status may have moved since it was read
    row.batch = HarvestBatch::update(&state.db, id, &payload)
        .await
        .map_err(internal)?
        .ok_or_else(|| MarketError::Conflict("Cannot update a sold batch".into()))?;
    if row.batch.status == BatchStatus::Listed {
        invalidate_listings(&state).await;
    }

    info!(%farmer_id, batch_id = %id, "harvest batch updated");
    Ok(Json(BatchView::new(row, OffsetDateTime::now_utc())))
}

#[instrument(skip(state))]
pub async fn delete_batch(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let row = load_owned(&state, farmer_id, id).await?;
    let conflict = || MarketError::Conflict("Cannot delete a listed or sold batch".into());
    if !row.batch.status.is_deletable() {
        return Err(conflict().into());
    }
    if !HarvestBatch::delete(&state.db, id).await.map_err(internal)? {
        warn!(batch_id = %id, "batch listed or sold before delete");
        return Err(conflict().into());
    }
    info!(%farmer_id, batch_id = %id, "harvest batch deleted");
    Ok(Json(MessageResponse { message: "Batch deleted successfully" }))
}

#[instrument(skip(state))]
pub async fn generate_qr_code(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QrCodeResponse>> {
    let row = load_owned(&state, farmer_id, id).await?;
    let batch = &row.batch;
    let payload = json!({
        "batch_code": batch.batch_code,
        "farmer_id": batch.farmer_id,
        "crop": row.crop_name,
        "harvest_date": batch.harvest_date.date().to_string(),
        "url": format!("{}/batch/{}", state.config.frontend_url.trim_end_matches('/'), batch.id),
    });
    HarvestBatch::store_qr_payload(&state.db, id, &payload)
        .await
        .map_err(internal)?;

    Ok(Json(QrCodeResponse {
        batch_code: batch.batch_code.clone(),
        qr_data: payload.to_string(),
        qr_payload: payload,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_status(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<Json<StatusChanged>> {
    let row = load_owned(&state, farmer_id, id).await?;
    let current = row.batch.status;
    let next = payload.status;

    if !current.can_set_directly(next) {
        warn!(batch_id = %id, ?current, ?next, "illegal batch status change");
        let msg = if current.can_transition_to(next) {
            "Create a listing to put a batch on the market".to_string()
        } else {
            format!("Cannot change batch status from {current:?} to {next:?}")
        };
        return Err(MarketError::Conflict(msg).into());
    }

    if current != next {
        let mut tx = state.db.begin().await.map_err(internal)?;
        let moved = HarvestBatch::transition(&mut *tx, id, current, next)
            .await
            .map_err(internal)?;
        if !moved {
            return Err(MarketError::Conflict("Batch status changed concurrently".into()).into());
        }
        // a batch that leaves `listed` takes its active listing off the market
        if current == BatchStatus::Listed {
            Listing::deactivate_for_batch(&mut *tx, id)
                .await
                .map_err(internal)?;
        }
        tx.commit().await.map_err(internal)?;
        if current == BatchStatus::Listed {
            invalidate_listings(&state).await;
        }
        info!(%farmer_id, batch_id = %id, ?current, ?next, "batch status changed");
    }

    Ok(Json(StatusChanged {
        id,
        batch_code: row.batch.batch_code,
        status: next,
    }))
}
