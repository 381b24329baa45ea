use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{dto::MessageResponse, extractors::FarmerUser},
    batches::repo_types::{BatchStatus, HarvestBatch},
    error::{internal, MarketError},
    marketplace::{
        cache,
        dto::{CreateListingRequest, ListingDetail, ListingQuery, UpdateListingRequest},
        filter::{self, Candidate},
        repo_types::{Listing, ListingRow, ListingView},
    },
    risk,
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn farmer_routes() -> Router<AppState> {
    Router::new()
        .route("/farmer/listings", get(list_farmer_listings).post(create_listing))
        .route("/farmer/listings/:id", put(update_listing))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/marketplace/listings", get(search_listings))
        .route("/marketplace/listings/:id", get(get_listing))
        .route("/marketplace/listings/:id/view", post(record_view))
}

fn detail(row: ListingRow, now: OffsetDateTime) -> ListingDetail {
    let view = ListingView::from(row);
    let spoilage_risk_level = match risk::estimate(&view.risk_input(), now) {
        Ok(level) => Some(level.get()),
        Err(e) => {
            warn!(listing_id = view.listing.id, error = %e, "risk not computable");
            None
        }
    };
    ListingDetail { listing: view, spoilage_risk_level }
}

async fn load_detail(state: &AppState, id: i64) -> ApiResult<ListingDetail> {
    let row = Listing::find_row(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Listing"))?;
    Ok(detail(row, OffsetDateTime::now_utc()))
}

#[instrument(skip(state))]
pub async fn search_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Json<Value>> {
    let (filter, page) = query.into_filter()?;

    let key = cache::generation(&state)
        .await
        .map(|generation| cache::search_key(generation, &filter, page));
    if let Some(key) = &key {
        if let Some(hit) = cache::lookup(&state, key).await {
            return Ok(Json(hit));
        }
    }

    let candidates: Vec<ListingView> = Listing::load_active(&state.db)
        .await
        .map_err(internal)?
        .into_iter()
        .map(ListingView::from)
        .collect();
    let result = filter::apply(candidates, &filter, page, OffsetDateTime::now_utc())?;
    let body = serde_json::to_value(&result).map_err(internal)?;

    if let Some(key) = &key {
        cache::store(&state, key, &body).await;
    }
    Ok(Json(body))
}

#[instrument(skip(state))]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ListingDetail>> {
    let found = Listing::record_view(&state.db, id).await.map_err(internal)?;
    if !found {
        return Err(MarketError::NotFound("Listing").into());
    }
    Ok(Json(load_detail(&state, id).await?))
}

#[instrument(skip(state))]
pub async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let found = Listing::record_view(&state.db, id).await.map_err(internal)?;
    if !found {
        return Err(MarketError::NotFound("Listing").into());
    }
    Ok(Json(MessageResponse { message: "View count updated" }))
}

#[instrument(skip(state))]
pub async fn list_farmer_listings(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
) -> ApiResult<Json<Vec<ListingDetail>>> {
    let rows = Listing::list_for_farmer(&state.db, farmer_id)
        .await
        .map_err(internal)?;
    let now = OffsetDateTime::now_utc();
    Ok(Json(rows.into_iter().map(|r| detail(r, now)).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_listing(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Json(mut payload): Json<CreateListingRequest>,
) -> ApiResult<(StatusCode, Json<ListingDetail>)> {
    payload.validate()?;

    let mut tx = state.db.begin().await.map_err(internal)?;
    let status = HarvestBatch::lock_owned_status(&mut *tx, farmer_id, payload.batch_id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Batch"))?;
    if Listing::has_active_for_batch(&mut *tx, payload.batch_id)
        .await
        .map_err(internal)?
    {
        return Err(MarketError::Conflict("Batch is already listed".into()).into());
    }
    if status != BatchStatus::Available {
        return Err(MarketError::Conflict("Batch is not available for listing".into()).into());
    }

    let listing = Listing::insert(
        &mut *tx,
        payload.batch_id,
        payload.price_per_unit,
        &payload.currency,
    )
    .await
    .map_err(internal)?;
    HarvestBatch::transition(&mut *tx, payload.batch_id, BatchStatus::Available, BatchStatus::Listed)
        .await
        .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    cache::invalidate_listings(&state).await;
    let created = load_detail(&state, listing.id).await?;
    state.events.broadcast("new-listing", &created);

    info!(%farmer_id, listing_id = listing.id, batch_id = %payload.batch_id, "listing created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, payload))]
pub async fn update_listing(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateListingRequest>,
) -> ApiResult<Json<ListingDetail>> {
    payload.validate()?;

    let mut tx = state.db.begin().await.map_err(internal)?;
    let owned = Listing::lock_owned(&mut *tx, farmer_id, id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Listing"))?;

    match payload.is_active {
        Some(false) if owned.is_active => {
            if owned.batch_status != BatchStatus::Listed {
                return Err(MarketError::Conflict("Batch is no longer listed".into()).into());
            }
            HarvestBatch::transition(&mut *tx, owned.batch_id, BatchStatus::Listed, BatchStatus::Available)
                .await
                .map_err(internal)?;
        }
        Some(true) if !owned.is_active => {
            if owned.batch_status != BatchStatus::Available {
                return Err(MarketError::Conflict("Batch is not available for listing".into()).into());
            }
            if Listing::has_active_for_batch(&mut *tx, owned.batch_id)
                .await
                .map_err(internal)?
            {
                return Err(MarketError::Conflict("Batch is already listed".into()).into());
            }
            HarvestBatch::transition(&mut *tx, owned.batch_id, BatchStatus::Available, BatchStatus::Listed)
                .await
                .map_err(internal)?;
        }
        _ => {}
    }

    Listing::update(&mut *tx, id, payload.is_active, payload.price_per_unit)
        .await
        .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    cache::invalidate_listings(&state).await;
    let updated = load_detail(&state, id).await?;
    state.events.broadcast("listing-updated", &updated);

    info!(%farmer_id, listing_id = id, "listing updated");
    Ok(Json(updated))
}
