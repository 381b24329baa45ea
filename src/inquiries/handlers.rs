use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::extractors::{BuyerUser, FarmerUser},
    error::{internal, MarketError},
    events::{buyer_room, farmer_room, inquiry_room, listing_room},
    inquiries::{
        dto::{CreateInquiryRequest, InquiryQuery, RespondRequest},
        repo::Party,
        repo_types::{Inquiry, InquiryRow},
    },
    marketplace::{filter::Paged, repo_types::Listing},
    notifications::repo_types::{Notification, KIND_INQUIRY_RESPONSE, KIND_NEW_INQUIRY},
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/buyer/inquiries", post(create_inquiry).get(list_buyer_inquiries))
        .route("/inquiries/farmer", get(list_farmer_inquiries))
        .route("/inquiries/:id/respond", put(respond_to_inquiry))
}

async fn load_row(state: &AppState, id: i64) -> ApiResult<InquiryRow> {
    Inquiry::find_row(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| MarketError::NotFound("Inquiry").into())
}

async fn page_for(
    state: &AppState,
    party: Party,
    query: InquiryQuery,
) -> ApiResult<Json<Paged<InquiryRow>>> {
    let page = query.page()?;
    let (items, total) = Inquiry::page_for(
        &state.db,
        party,
        query.status,
        i64::from(page.limit),
        page.offset() as i64,
    )
    .await
    .map_err(internal)?;
    let total = total.max(0) as usize;
    Ok(Json(Paged {
        items,
        page: page.page,
        limit: page.limit,
        total,
        pages: total.div_ceil(page.limit as usize),
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_inquiry(
    State(state): State<AppState>,
    BuyerUser(buyer_id): BuyerUser,
    Json(mut payload): Json<CreateInquiryRequest>,
) -> ApiResult<(StatusCode, Json<InquiryRow>)> {
    payload.validate()?;

    let mut tx = state.db.begin().await.map_err(internal)?;
    let owner = Inquiry::active_listing_owner(&mut *tx, payload.listing_id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Listing"))?;

    let inquiry = Inquiry::insert(&mut *tx, buyer_id, &payload).await?;
    Listing::record_inquiry(&mut *tx, payload.listing_id)
        .await
        .map_err(internal)?;
    Notification::create(
        &mut *tx,
        owner.farmer_id,
        KIND_NEW_INQUIRY,
        "New inquiry",
        &format!("A buyer asked about your {} listing", owner.crop_name),
        &json!({ "inquiry_id": inquiry.id, "listing_id": inquiry.listing_id }),
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    let row = load_row(&state, inquiry.id).await?;
    state
        .events
        .to_room(listing_room(payload.listing_id), "new-inquiry", &row);
    state
        .events
        .to_room(farmer_room(owner.farmer_id), "new-inquiry", &row);

    info!(%buyer_id, inquiry_id = inquiry.id, listing_id = payload.listing_id, "inquiry created");
    Ok((StatusCode::CREATED, Json(row)))
}

#[instrument(skip(state))]
pub async fn list_buyer_inquiries(
    State(state): State<AppState>,
    BuyerUser(buyer_id): BuyerUser,
    Query(query): Query<InquiryQuery>,
) -> ApiResult<Json<Paged<InquiryRow>>> {
    page_for(&state, Party::Buyer(buyer_id), query).await
}

#[instrument(skip(state))]
pub async fn list_farmer_inquiries(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Query(query): Query<InquiryQuery>,
) -> ApiResult<Json<Paged<InquiryRow>>> {
    page_for(&state, Party::Farmer(farmer_id), query).await
}

#[instrument(skip(state, payload))]
pub async fn respond_to_inquiry(
    State(state): State<AppState>,
    FarmerUser(farmer_id): FarmerUser,
    Path(id): Path<i64>,
    Json(mut payload): Json<RespondRequest>,
) -> ApiResult<Json<InquiryRow>> {
    payload.validate()?;

    let mut tx = state.db.begin().await.map_err(internal)?;
    let inquiry = Inquiry::lock_for_farmer(&mut *tx, farmer_id, id)
        .await
        .map_err(internal)?
        .ok_or(MarketError::NotFound("Inquiry"))?;
    if inquiry.status.is_final() {
        warn!(inquiry_id = id, status = ?inquiry.status, "response to a final inquiry");
        return Err(MarketError::Conflict("Inquiry is already closed".into()).into());
    }

    Inquiry::respond(&mut *tx, id, payload.status, &payload.response_message)
        .await
        .map_err(internal)?;
    Notification::create(
        &mut *tx,
        inquiry.buyer_id,
        KIND_INQUIRY_RESPONSE,
        "Inquiry response",
        &payload.response_message,
        &json!({ "inquiry_id": id, "listing_id": inquiry.listing_id, "status": payload.status }),
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    let row = load_row(&state, id).await?;
    state
        .events
        .to_room(inquiry_room(id), "inquiry-response", &row);
    state
        .events
        .to_room(buyer_room(inquiry.buyer_id), "inquiry-response", &row);

    info!(%farmer_id, inquiry_id = id, status = ?payload.status, "inquiry answered");
    Ok(Json(row))
}
