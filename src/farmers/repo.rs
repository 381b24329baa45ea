use anyhow::Context;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::batches::repo_types::{BatchWithCrop, BATCH_COLUMNS, CROP_JOIN_COLUMNS};
use crate::farmers::dto::UpdateFarmerRequest;
use crate::farmers::repo_types::{
    running_mean, FarmerProfile, MonthlyTotal, StatusTotal, FARMER_COLUMNS,
};

/// Months covered by the dashboard harvest chart, current month included.
pub const DASHBOARD_MONTHS: i32 = 6;
pub const RECENT_BATCHES: i64 = 5;

impl FarmerProfile {
    pub async fn find(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<FarmerProfile>> {
        let sql = format!("SELECT {FARMER_COLUMNS} FROM farmers WHERE user_id = $1");
        let profile = sqlx::query_as::<_, FarmerProfile>(&sql)
            .bind(user_id)
            .fetch_optional(db)
            .await
            .context("find farmer profile")?;
        Ok(profile)
    }

    pub async fn update(
        db: &PgPool,
        user_id: Uuid,
        req: &UpdateFarmerRequest,
    ) -> anyhow::Result<Option<FarmerProfile>> {
        let sql = format!(
            r#"
            UPDATE farmers
               SET farm_name = COALESCE($2, farm_name),
                   farm_size = COALESCE($3, farm_size),
                   primary_crops = COALESCE($4, primary_crops),
                   certification_level = COALESCE($5, certification_level)
             WHERE user_id = $1
            RETURNING {FARMER_COLUMNS}
            "#
        );
        let profile = sqlx::query_as::<_, FarmerProfile>(&sql)
            .bind(user_id)
            .bind(req.farm_name.as_deref())
            .bind(req.farm_size)
            .bind(req.primary_crops.as_ref().map(Json))
            .bind(req.certification_level.as_deref())
            .fetch_optional(db)
            .await
            .context("update farmer profile")?;
        Ok(profile)
    }

    /// Batch count and quantity per status.
    pub async fn status_totals(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<StatusTotal>> {
        let rows = sqlx::query_as::<_, StatusTotal>(
            r#"
            SELECT status, COUNT(*) AS batches, COALESCE(SUM(quantity), 0)::float8 AS quantity
              FROM harvest_batches
             WHERE farmer_id = $1
             GROUP BY status
             ORDER BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
        .context("batch status totals")?;
        Ok(rows)
    }

    pub async fn monthly_totals(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<MonthlyTotal>> {
        let rows = sqlx::query_as::<_, MonthlyTotal>(
            r#"
            SELECT to_char(date_trunc('month', harvest_date), 'YYYY-MM') AS month,
                   COUNT(*) AS batches,
                   COALESCE(SUM(quantity), 0)::float8 AS quantity
              FROM harvest_batches
             WHERE farmer_id = $1
               AND harvest_date >= date_trunc('month', now()) - make_interval(months => $2 - 1)
             GROUP BY 1
             ORDER BY 1
            "#,
        )
        .bind(user_id)
        .bind(DASHBOARD_MONTHS)
        .fetch_all(db)
        .await
        .context("monthly harvest totals")?;
        Ok(rows)
    }

    pub async fn recent_batches(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<BatchWithCrop>> {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS}, {CROP_JOIN_COLUMNS}
              FROM harvest_batches b
              JOIN crop_profiles c ON c.id = b.crop_id
             WHERE b.farmer_id = $1
             ORDER BY b.created_at DESC
             LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, BatchWithCrop>(&sql)
            .bind(user_id)
            .bind(RECENT_BATCHES)
            .fetch_all(db)
            .await
            .context("recent batches")?;
        Ok(rows)
    }

    /// Folds one rating into the farmer's mean. `None` when the farmer does not exist.
    pub async fn add_rating(
        db: &PgPool,
        farmer_id: Uuid,
        rating: u8,
    ) -> anyhow::Result<Option<(f64, i32)>> {
        let mut tx = db.begin().await.context("begin tx")?;

        let current: Option<(Option<f64>, i32)> = sqlx::query_as(
            "SELECT rating, rating_count FROM farmers WHERE user_id = $1 FOR UPDATE",
        )
        .bind(farmer_id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock farmer rating")?;
        let Some((mean, count)) = current else {
            return Ok(None);
        };

        let mean = running_mean(mean, count, rating);
        let count = count + 1;
        sqlx::query("UPDATE farmers SET rating = $2, rating_count = $3 WHERE user_id = $1")
            .bind(farmer_id)
            .bind(mean)
            .bind(count)
            .execute(&mut *tx)
            .await
            .context("store farmer rating")?;

        tx.commit().await.context("commit tx")?;
        Ok(Some((mean, count)))
    }
}
