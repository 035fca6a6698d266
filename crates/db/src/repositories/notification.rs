use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use disputary_core::domain::dispute::DisputeId;
use disputary_core::domain::notification::{
    Notification, NotificationId, NotificationKind, RecipientKind,
};

use super::{parse_bool_int, parse_timestamp, NotificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn insert_batch_within(
        &self,
        conn: &mut SqliteConnection,
        notifications: &[Notification],
    ) -> Result<(), RepositoryError> {
        for notification in notifications {
            sqlx::query(
                "INSERT INTO notifications (
                    id,
                    dispute_id,
                    recipient_kind,
                    recipient_id,
                    kind,
                    title,
                    message,
                    is_read,
                    created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&notification.id.0)
            .bind(&notification.dispute_id.0)
            .bind(notification.recipient_kind.as_str())
            .bind(&notification.recipient_id)
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(i64::from(notification.is_read))
            .bind(notification.created_at.to_rfc3339())
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    async fn list_for_dispute(
        &self,
        dispute_id: &DisputeId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                dispute_id,
                recipient_kind,
                recipient_id,
                kind,
                title,
                message,
                is_read,
                created_at
             FROM notifications
             WHERE dispute_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&dispute_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(notification_from_row).collect()
    }
}

fn notification_from_row(row: SqliteRow) -> Result<Notification, RepositoryError> {
    let recipient_raw = row.try_get::<String, _>("recipient_kind")?;
    let recipient_kind = RecipientKind::parse(&recipient_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown recipient_kind `{recipient_raw}`"))
    })?;

    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = NotificationKind::parse(&kind_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown notification kind `{kind_raw}`"))
    })?;

    Ok(Notification {
        id: NotificationId(row.try_get("id")?),
        dispute_id: DisputeId(row.try_get("dispute_id")?),
        recipient_kind,
        recipient_id: row.try_get("recipient_id")?,
        kind,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        is_read: parse_bool_int("is_read", row.try_get("is_read")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
