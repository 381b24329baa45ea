use anyhow::Context;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::buyers::dto::UpdateBuyerRequest;
use crate::buyers::repo_types::{BuyerProfile, BUYER_COLUMNS};

pub const RECENT_INQUIRIES: i64 = 10;

impl BuyerProfile {
    pub async fn find(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<BuyerProfile>> {
        let sql = format!("SELECT {BUYER_COLUMNS} FROM buyers WHERE user_id = $1");
        let profile = sqlx::query_as::<_, BuyerProfile>(&sql)
            .bind(user_id)
            .fetch_optional(db)
            .await
            .context("find buyer profile")?;
        Ok(profile)
    }

    /// Creates the profile on first write, named after the user unless a business name is given.
    pub async fn upsert(
        db: &PgPool,
        user_id: Uuid,
        req: &UpdateBuyerRequest,
    ) -> anyhow::Result<BuyerProfile> {
        let sql = format!(
            r#"
            INSERT INTO buyers AS x (user_id, business_name, business_type, buying_capacity, preferred_crops)
            VALUES ($1,
                    COALESCE($2, (SELECT name FROM users WHERE id = $1)),
                    $3, $4, COALESCE($5, '[]'::jsonb))
            ON CONFLICT (user_id) DO UPDATE
               SET business_name = COALESCE($2, x.business_name),
                   business_type = COALESCE($3, x.business_type),
                   buying_capacity = COALESCE($4, x.buying_capacity),
                   preferred_crops = COALESCE($5, x.preferred_crops)
            RETURNING {BUYER_COLUMNS}
            "#
        );
        let profile = sqlx::query_as::<_, BuyerProfile>(&sql)
            .bind(user_id)
            .bind(req.business_name.as_deref())
            .bind(req.business_type.as_deref())
            .bind(req.buying_capacity)
            .bind(req.preferred_crops.as_ref().map(Json))
            .fetch_one(db)
            .await
            .context("upsert buyer profile")?;
        Ok(profile)
    }
}
