use serde_json::Value;
use tracing::{debug, warn};

use crate::marketplace::filter::{ListingFilter, Page};
use crate::state::AppState;

/// Bumped by every listing write; search keys embed it.
pub const GENERATION_KEY: &str = "listings:gen";

pub fn search_key(generation: i64, filter: &ListingFilter, page: Page) -> String {
    let normalised = serde_json::json!({ "filter": filter, "page": page });
    format!("listings:{generation}:{normalised}")
}

/// Current cache generation. `None` when the cache is unreachable.
pub async fn generation(state: &AppState) -> Option<i64> {
    match state.cache.get(GENERATION_KEY).await {
        Ok(raw) => Some(raw.and_then(|v| v.parse().ok()).unwrap_or(0)),
        Err(e) => {
            warn!(error = %e, "listing cache unavailable");
            None
        }
    }
}

pub async fn lookup(state: &AppState, key: &str) -> Option<Value> {
    match state.cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(v) => {
                debug!(%key, "listing cache hit");
                Some(v)
            }
            Err(e) => {
                warn!(%key, error = %e, "corrupt listing cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(%key, error = %e, "listing cache read failed");
            None
        }
    }
}

pub async fn store(state: &AppState, key: &str, value: &Value) {
    let ttl = state.config.listings_cache_ttl_secs;
    if let Err(e) = state.cache.set_ex(key, &value.to_string(), ttl).await {
        warn!(%key, error = %e, "listing cache write failed");
    }
}

/// Makes every cached search unreachable.
pub async fn invalidate_listings(state: &AppState) {
    match state.cache.incr(GENERATION_KEY).await {
        Ok(generation) => debug!(generation, "listing cache invalidated"),
        Err(e) => warn!(error = %e, "listing cache invalidation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::filter::SortKey;
    use serde_json::json;

    #[test]
    fn key_changes_with_generation_and_query() {
        let filter = ListingFilter { max_risk: Some(3), ..Default::default() };
        let a = search_key(0, &filter, Page::default());
        assert_eq!(a, search_key(0, &filter.clone(), Page::default()));
        assert_ne!(a, search_key(1, &filter, Page::default()));

        let sorted = ListingFilter { sort: SortKey::PriceAsc, ..filter.clone() };
        assert_ne!(a, search_key(0, &sorted, Page::default()));
        assert!(a.starts_with("listings:0:"));
    }

    #[tokio::test]
    async fn invalidation_moves_to_a_new_generation() {
        let state = AppState::fake();
        assert_eq!(generation(&state).await, Some(0));

        let filter = ListingFilter::default();
        let key = search_key(0, &filter, Page::default());
        store(&state, &key, &json!({ "items": [] })).await;
        assert_eq!(lookup(&state, &key).await, Some(json!({ "items": [] })));

        invalidate_listings(&state).await;
        let next = generation(&state).await.unwrap();
        assert_eq!(next, 1);
        assert_eq!(lookup(&state, &search_key(next, &filter, Page::default())).await, None);
    }
}
