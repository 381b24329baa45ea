use anyhow::Context;
use serde_json::json;
use sqlx::{types::Json, PgPool};
use tracing::info;

use crate::crops::dto::CreateCropRequest;
use crate::crops::repo_types::{CropProfile, CROP_COLUMNS, DEFAULT_CROPS};
use crate::error::MarketError;

impl CropProfile {
    /// All profiles, ordered by category then name.
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<CropProfile>> {
        let sql = format!("SELECT {CROP_COLUMNS} FROM crop_profiles ORDER BY category, name");
        let crops = sqlx::query_as::<_, CropProfile>(&sql)
            .fetch_all(db)
            .await
            .context("list crop profiles")?;
        Ok(crops)
    }

    pub async fn find(db: &PgPool, id: i32) -> anyhow::Result<Option<CropProfile>> {
        let sql = format!("SELECT {CROP_COLUMNS} FROM crop_profiles WHERE id = $1");
        let crop = sqlx::query_as::<_, CropProfile>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find crop profile")?;
        Ok(crop)
    }

    pub async fn create(db: &PgPool, req: &CreateCropRequest) -> Result<CropProfile, MarketError> {
        let sql = format!(
            r#"
            INSERT INTO crop_profiles (name, category, spoilage_sensitivity, shelf_life_days, storage_hints)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CROP_COLUMNS}
            "#
        );
        let hints = req.storage_hints.clone().unwrap_or_else(|| json!({}));
        sqlx::query_as::<_, CropProfile>(&sql)
            .bind(req.name.trim())
            .bind(req.category.trim())
            .bind(req.spoilage_sensitivity)
            .bind(req.shelf_life_days)
            .bind(Json(hints))
            .fetch_one(db)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    MarketError::Conflict(format!("Crop '{}' already exists", req.name.trim()))
                }
                other => MarketError::Database(other),
            })
    }

    /// Inserts the default crop set; existing names are left untouched.
    pub async fn seed_defaults(db: &PgPool) -> anyhow::Result<()> {
        let mut inserted = 0;
        for (name, category, sensitivity, shelf_life, temperature, humidity) in DEFAULT_CROPS {
            let res = sqlx::query(
                r#"
                INSERT INTO crop_profiles (name, category, spoilage_sensitivity, shelf_life_days, storage_hints)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(name)
            .bind(category)
            .bind(sensitivity)
            .bind(shelf_life)
            .bind(Json(json!({ "temperature": temperature, "humidity": humidity })))
            .execute(db)
            .await
            .with_context(|| format!("seed crop {name}"))?;
            inserted += res.rows_affected();
        }
        info!(inserted, "crop profiles seeded");
        Ok(())
    }
}
