use anyhow::Context;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::MarketError;
use crate::inquiries::dto::CreateInquiryRequest;
use crate::inquiries::repo_types::{
    Inquiry, InquiryRow, InquiryStatus, ListingOwner, INQUIRY_COLUMNS, INQUIRY_ROW_SELECT,
};

/// Which side of the inquiry is asking.
#[derive(Debug, Clone, Copy)]
pub enum Party {
    Buyer(Uuid),
    Farmer(Uuid),
}

impl Party {
    fn clause(self) -> (&'static str, Uuid) {
        match self {
            Party::Buyer(id) => ("i.buyer_id = $1", id),
            Party::Farmer(id) => ("b.farmer_id = $1", id),
        }
    }
}

impl Inquiry {
    /// Owner of the listing if it is active, read under a share lock.
    pub async fn active_listing_owner<'e, E: PgExecutor<'e>>(
        exec: E,
        listing_id: i64,
    ) -> anyhow::Result<Option<ListingOwner>> {
        let owner = sqlx::query_as::<_, ListingOwner>(
            r#"
            SELECT b.farmer_id, c.name AS crop_name
              FROM listings l
              JOIN harvest_batches b ON b.id = l.batch_id
              JOIN crop_profiles c ON c.id = b.crop_id
             WHERE l.id = $1 AND l.is_active
               FOR SHARE OF l
            "#,
        )
        .bind(listing_id)
        .fetch_optional(exec)
        .await
        .context("find listing owner")?;
        Ok(owner)
    }

    /// Inserts a pending inquiry. A second pending inquiry for the same listing conflicts.
    pub async fn insert<'e, E: PgExecutor<'e>>(
        exec: E,
        buyer_id: Uuid,
        req: &CreateInquiryRequest,
    ) -> Result<Inquiry, MarketError> {
        let sql = format!(
            r#"
            INSERT INTO inquiries AS i (buyer_id, listing_id, message, quantity_interested, proposed_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {INQUIRY_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Inquiry>(&sql)
            .bind(buyer_id)
            .bind(req.listing_id)
            .bind(&req.message)
            .bind(req.quantity_interested)
            .bind(req.proposed_price)
            .fetch_one(exec)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    MarketError::Conflict(
                        "You already have a pending inquiry for this listing".into(),
                    )
                }
                other => MarketError::Database(other),
            })
    }

    pub async fn find_row(db: &PgPool, id: i64) -> anyhow::Result<Option<InquiryRow>> {
        let sql = format!("{INQUIRY_ROW_SELECT} WHERE i.id = $1");
        let row = sqlx::query_as::<_, InquiryRow>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find inquiry")?;
        Ok(row)
    }

    /// One page of the party's inquiries, newest first, plus the total count.
    pub async fn page_for(
        db: &PgPool,
        party: Party,
        status: Option<InquiryStatus>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<InquiryRow>, i64)> {
        let (clause, id) = party.clause();
        let filter = format!("WHERE {clause} AND ($2::inquiry_status IS NULL OR i.status = $2)");

        let sql = format!(
            "{INQUIRY_ROW_SELECT} {filter} ORDER BY i.created_at DESC, i.id DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, InquiryRow>(&sql)
            .bind(id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
            .context("list inquiries")?;

        let count_sql = format!(
            r#"
            SELECT COUNT(*)
              FROM inquiries i
              JOIN listings l ON l.id = i.listing_id
              JOIN harvest_batches b ON b.id = l.batch_id
             {filter}
            "#
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(id)
            .bind(status)
            .fetch_one(db)
            .await
            .context("count inquiries")?;

        Ok((rows, total))
    }

    /// The inquiry if it concerns one of the farmer's listings, locked for update.
    pub async fn lock_for_farmer<'e, E: PgExecutor<'e>>(
        exec: E,
        farmer_id: Uuid,
        id: i64,
    ) -> anyhow::Result<Option<Inquiry>> {
        let sql = format!(
            r#"
            SELECT {INQUIRY_COLUMNS}
              FROM inquiries i
              JOIN listings l ON l.id = i.listing_id
              JOIN harvest_batches b ON b.id = l.batch_id
             WHERE i.id = $1 AND b.farmer_id = $2
               FOR UPDATE OF i
            "#
        );
        let inquiry = sqlx::query_as::<_, Inquiry>(&sql)
            .bind(id)
            .bind(farmer_id)
            .fetch_optional(exec)
            .await
            .context("lock inquiry")?;
        Ok(inquiry)
    }

    pub async fn respond<'e, E: PgExecutor<'e>>(
        exec: E,
        id: i64,
        status: InquiryStatus,
        response_message: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE inquiries
               SET status = $2, response_message = $3, responded_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(response_message)
        .execute(exec)
        .await
        .context("respond to inquiry")?;
        Ok(())
    }

    /// Total and pending inquiry counts of a buyer.
    pub async fn buyer_counts(db: &PgPool, buyer_id: Uuid) -> anyhow::Result<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'pending')
              FROM inquiries
             WHERE buyer_id = $1
            "#,
        )
        .bind(buyer_id)
        .fetch_one(db)
        .await
        .context("count buyer inquiries")?;
        Ok(counts)
    }
}
