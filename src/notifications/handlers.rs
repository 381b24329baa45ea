use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    auth::services::AuthUser,
    error::{internal, MarketError},
    notifications::repo_types::Notification,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read", post(mark_read))
        .route("/notifications/unread-count", get(unread_count))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub notification_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[instrument(skip(state))]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Notification>>, (StatusCode, String)> {
    let rows = Notification::latest_for_user(&state.db, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[instrument(skip(state, payload))]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, (StatusCode, String)> {
    if payload.notification_ids.is_empty() {
        return Err(MarketError::InvalidInput("notification_ids must not be empty".into()).into());
    }
    let updated = Notification::mark_read(&state.db, user.id, &payload.notification_ids)
        .await
        .map_err(internal)?;
    debug!(user_id = %user.id, updated, "notifications marked read");
    Ok(Json(MarkReadResponse { updated }))
}

#[instrument(skip(state))]
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UnreadCount>, (StatusCode, String)> {
    let count = Notification::unread_count(&state.db, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(UnreadCount { count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_read_request_requires_id_array() {
        let req: MarkReadRequest = serde_json::from_str(r#"{"notification_ids":[3,7]}"#).unwrap();
        assert_eq!(req.notification_ids, vec![3, 7]);
        assert!(serde_json::from_str::<MarkReadRequest>(r#"{"notification_ids":5}"#).is_err());
    }
}
