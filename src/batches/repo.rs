use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, PgExecutor, PgPool};
use uuid::Uuid;

use crate::batches::dto::{CreateBatchRequest, UpdateBatchRequest};
use crate::batches::ids::{BatchIdSink, InsertOutcome};
use crate::batches::repo_types::{
    BatchStatus, BatchWithCrop, HarvestBatch, BATCH_COLUMNS, CROP_JOIN_COLUMNS,
};

const BATCH_CODE_CONSTRAINT: &str = "harvest_batches_batch_code_key";

impl HarvestBatch {
    pub async fn list_for_farmer(db: &PgPool, farmer_id: Uuid) -> anyhow::Result<Vec<BatchWithCrop>> {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS}, {CROP_JOIN_COLUMNS}
              FROM harvest_batches b
              JOIN crop_profiles c ON c.id = b.crop_id
             WHERE b.farmer_id = $1
             ORDER BY b.created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, BatchWithCrop>(&sql)
            .bind(farmer_id)
            .fetch_all(db)
            .await
            .context("list farmer batches")?;
        Ok(rows)
    }

    /// Batch owned by `farmer_id`, with its crop.
    pub async fn find_owned(
        db: &PgPool,
        farmer_id: Uuid,
        id: Uuid,
    ) -> anyhow::Result<Option<BatchWithCrop>> {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS}, {CROP_JOIN_COLUMNS}
              FROM harvest_batches b
              JOIN crop_profiles c ON c.id = b.crop_id
             WHERE b.id = $1 AND b.farmer_id = $2
            "#
        );
        let row = sqlx::query_as::<_, BatchWithCrop>(&sql)
            .bind(id)
            .bind(farmer_id)
            .fetch_optional(db)
            .await
            .context("find batch")?;
        Ok(row)
    }

    /// Applies the edit unless the batch has left the editable statuses. `None` then.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        req: &UpdateBatchRequest,
    ) -> anyhow::Result<Option<HarvestBatch>> {
        let sql = format!(
            r#"
            UPDATE harvest_batches b
               SET quantity = COALESCE($2, b.quantity),
                   unit = COALESCE($3, b.unit),
                   harvest_date = COALESCE($4, b.harvest_date),
                   storage_conditions = COALESCE($5, b.storage_conditions),
                   updated_at = now()
             WHERE b.id = $1 AND b.status = ANY($6)
            RETURNING {BATCH_COLUMNS}
            "#
        );
        let batch = sqlx::query_as::<_, HarvestBatch>(&sql)
            .bind(id)
            .bind(req.quantity)
            .bind(req.unit)
            .bind(req.harvest_date)
            .bind(req.storage_conditions.map(Json))
            .bind(&BatchStatus::EDITABLE[..])
            .fetch_optional(db)
            .await
            .context("update batch")?;
        Ok(batch)
    }

    /// Deletes the batch if it is still in a deletable status.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM harvest_batches WHERE id = $1 AND status = ANY($2)")
            .bind(id)
            .bind(&BatchStatus::DELETABLE[..])
            .execute(db)
            .await
            .context("delete batch")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn store_qr_payload(db: &PgPool, id: Uuid, payload: &Value) -> anyhow::Result<()> {
        sqlx::query("UPDATE harvest_batches SET qr_payload = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(Json(payload))
            .execute(db)
            .await
            .context("store qr payload")?;
        Ok(())
    }

    /// Status of a batch owned by `farmer_id`, locked until the transaction ends.
    pub async fn lock_owned_status<'e, E: PgExecutor<'e>>(
        exec: E,
        farmer_id: Uuid,
        id: Uuid,
    ) -> anyhow::Result<Option<BatchStatus>> {
        let status = sqlx::query_scalar::<_, BatchStatus>(
            "SELECT status FROM harvest_batches WHERE id = $1 AND farmer_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(farmer_id)
        .fetch_optional(exec)
        .await
        .context("lock batch")?;
        Ok(status)
    }

    /// Moves the batch from `from` to `to`. False when the status is no longer `from`.
    pub async fn transition<'e, E: PgExecutor<'e>>(
        exec: E,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE harvest_batches
               SET status = $3, updated_at = now()
             WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(exec)
        .await
        .context("update batch status")?;
        Ok(res.rows_affected() == 1)
    }
}

/// Inserts a new batch row under a caller-chosen code.
pub struct PgBatchSink<'a> {
    pub db: &'a PgPool,
    pub farmer_id: Uuid,
    pub req: &'a CreateBatchRequest,
}

#[async_trait]
impl BatchIdSink for PgBatchSink<'_> {
    type Record = HarvestBatch;

    async fn highest_sequence(&self, prefix: &str) -> anyhow::Result<u32> {
        let codes: Vec<String> = sqlx::query_scalar(
            "SELECT batch_code FROM harvest_batches WHERE left(batch_code, char_length($1) + 1) = $1 || '-'",
        )
        .bind(prefix)
        .fetch_all(self.db)
        .await
        .context("read batch codes")?;
        Ok(codes
            .iter()
            .filter_map(|c| crate::batches::ids::parse_sequence(c, prefix))
            .max()
            .unwrap_or(0))
    }

    async fn try_insert(&self, code: &str) -> anyhow::Result<InsertOutcome<HarvestBatch>> {
        let sql = format!(
            r#"
            INSERT INTO harvest_batches AS b
                   (batch_code, farmer_id, crop_id, quantity, unit, harvest_date, storage_conditions, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'available')
            RETURNING {BATCH_COLUMNS}
            "#
        );
        let res = sqlx::query_as::<_, HarvestBatch>(&sql)
            .bind(code)
            .bind(self.farmer_id)
            .bind(self.req.crop_id)
            .bind(self.req.quantity)
            .bind(self.req.unit)
            .bind(self.req.harvest_date)
            .bind(Json(self.req.storage_conditions))
            .fetch_one(self.db)
            .await;

        match res {
            Ok(batch) => Ok(InsertOutcome::Inserted(batch)),
            Err(sqlx::Error::Database(e)) if e.constraint() == Some(BATCH_CODE_CONSTRAINT) => {
                Ok(InsertOutcome::Conflict)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert batch")),
        }
    }
}
