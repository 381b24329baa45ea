use anyhow::Context;
use serde_json::Value;
use sqlx::{types::Json, PgExecutor, PgPool};
use uuid::Uuid;

use crate::notifications::repo_types::{Notification, NOTIFICATION_COLUMNS};

pub const LATEST_LIMIT: i64 = 50;

impl Notification {
    pub async fn create<'e, E: PgExecutor<'e>>(
        exec: E,
        user_id: Uuid,
        kind: &str,
        title: &str,
        message: &str,
        data: &Value,
    ) -> anyhow::Result<Notification> {
        let sql = format!(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let notification = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(kind)
            .bind(title)
            .bind(message)
            .bind(Json(data))
            .fetch_one(exec)
            .await
            .context("insert notification")?;
        Ok(notification)
    }

    pub async fn latest_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
              FROM notifications
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(LATEST_LIMIT)
            .fetch_all(db)
            .await
            .context("list notifications")?;
        Ok(rows)
    }

    /// Marks the caller's notifications among `ids` read. Foreign ids are ignored.
    pub async fn mark_read(db: &PgPool, user_id: Uuid, ids: &[i64]) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND id = ANY($2) AND NOT is_read",
        )
        .bind(user_id)
        .bind(ids)
        .execute(db)
        .await
        .context("mark notifications read")?;
        Ok(res.rows_affected())
    }

    pub async fn unread_count(db: &PgPool, user_id: Uuid) -> anyhow::Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("count unread notifications")?;
        Ok(n)
    }
}
