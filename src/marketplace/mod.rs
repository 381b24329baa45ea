pub mod cache;
pub mod dto;
pub mod filter;
pub mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::farmer_routes())
        .merge(handlers::public_routes())
}
