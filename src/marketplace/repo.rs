use anyhow::Context;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::marketplace::repo_types::{
    Listing, ListingRow, OwnedListing, LISTING_COLUMNS, LISTING_ROW_SELECT,
};

impl Listing {
    /// Every active listing, oldest first, as search candidates.
    pub async fn load_active(db: &PgPool) -> anyhow::Result<Vec<ListingRow>> {
        let sql = format!("{LISTING_ROW_SELECT} WHERE l.is_active ORDER BY l.listed_at, l.id");
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .fetch_all(db)
            .await
            .context("load active listings")?;
        Ok(rows)
    }

    pub async fn find_row(db: &PgPool, id: i64) -> anyhow::Result<Option<ListingRow>> {
        let sql = format!("{LISTING_ROW_SELECT} WHERE l.id = $1");
        let row = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find listing")?;
        Ok(row)
    }

    pub async fn list_for_farmer(db: &PgPool, farmer_id: Uuid) -> anyhow::Result<Vec<ListingRow>> {
        let sql = format!("{LISTING_ROW_SELECT} WHERE b.farmer_id = $1 ORDER BY l.listed_at DESC");
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(farmer_id)
            .fetch_all(db)
            .await
            .context("list farmer listings")?;
        Ok(rows)
    }

    /// Locks the listing and its batch if `farmer_id` owns them.
    pub async fn lock_owned<'e, E: PgExecutor<'e>>(
        exec: E,
        farmer_id: Uuid,
        id: i64,
    ) -> anyhow::Result<Option<OwnedListing>> {
        let row = sqlx::query_as::<_, OwnedListing>(
            r#"
            SELECT l.id, l.batch_id, l.is_active, b.status AS batch_status
              FROM listings l
              JOIN harvest_batches b ON b.id = l.batch_id
             WHERE l.id = $1 AND b.farmer_id = $2
               FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(farmer_id)
        .fetch_optional(exec)
        .await
        .context("lock listing")?;
        Ok(row)
    }

    pub async fn has_active_for_batch<'e, E: PgExecutor<'e>>(
        exec: E,
        batch_id: Uuid,
    ) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM listings WHERE batch_id = $1 AND is_active)",
        )
        .bind(batch_id)
        .fetch_one(exec)
        .await
        .context("check active listing")?;
        Ok(exists)
    }

    pub async fn insert<'e, E: PgExecutor<'e>>(
        exec: E,
        batch_id: Uuid,
        price_per_unit: f64,
        currency: &str,
    ) -> anyhow::Result<Listing> {
        let sql = format!(
            r#"
            INSERT INTO listings AS l (batch_id, price_per_unit, currency)
            VALUES ($1, $2, $3)
            RETURNING {LISTING_COLUMNS}
            "#
        );
        let listing = sqlx::query_as::<_, Listing>(&sql)
            .bind(batch_id)
            .bind(price_per_unit)
            .bind(currency)
            .fetch_one(exec)
            .await
            .context("insert listing")?;
        Ok(listing)
    }

    pub async fn update<'e, E: PgExecutor<'e>>(
        exec: E,
        id: i64,
        is_active: Option<bool>,
        price_per_unit: Option<f64>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE listings
               SET is_active = COALESCE($2, is_active),
                   price_per_unit = COALESCE($3, price_per_unit)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(is_active)
        .bind(price_per_unit)
        .execute(exec)
        .await
        .context("update listing")?;
        Ok(())
    }

    /// Deactivates the batch's active listing, returning how many rows changed.
    pub async fn deactivate_for_batch<'e, E: PgExecutor<'e>>(
        exec: E,
        batch_id: Uuid,
    ) -> anyhow::Result<u64> {
        let res = sqlx::query("UPDATE listings SET is_active = FALSE WHERE batch_id = $1 AND is_active")
            .bind(batch_id)
            .execute(exec)
            .await
            .context("deactivate listing")?;
        Ok(res.rows_affected())
    }

    /// False when no active listing has this id.
    pub async fn record_view(db: &PgPool, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE listings SET view_count = view_count + 1 WHERE id = $1 AND is_active",
        )
        .bind(id)
        .execute(db)
        .await
        .context("record listing view")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn record_inquiry<'e, E: PgExecutor<'e>>(exec: E, id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE listings SET inquiry_count = inquiry_count + 1 WHERE id = $1")
            .bind(id)
            .execute(exec)
            .await
            .context("record listing inquiry")?;
        Ok(())
    }

    pub async fn count_active(db: &PgPool) -> anyhow::Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE is_active")
            .fetch_one(db)
            .await
            .context("count active listings")?;
        Ok(n)
    }
}
