mod app;
mod auth;
mod batches;
mod buyers;
mod cache;
mod config;
mod crops;
mod error;
mod events;
mod farmers;
mod geo;
mod inquiries;
mod marketplace;
mod notifications;
mod risk;
mod sms;
mod state;

use crate::crops::repo_types::CropProfile;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "harvest_market=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    sqlx::migrate!("./migrations").run(&app_state.db).await?;
    CropProfile::seed_defaults(&app_state.db).await?;

    app::serve(app::build_app(app_state)).await
}
