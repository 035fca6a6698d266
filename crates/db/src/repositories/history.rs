use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use disputary_core::domain::dispute::{DisputeHistory, DisputeId, HistoryId};
use disputary_core::domain::payload::PayloadId;

use super::{parse_timestamp, DisputeHistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDisputeHistoryRepository {
    pool: DbPool,
}

impl SqlDisputeHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DisputeHistoryRepository for SqlDisputeHistoryRepository {
    async fn append_within(
        &self,
        conn: &mut SqliteConnection,
        entry: &DisputeHistory,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO dispute_history (
                id,
                dispute_id,
                payload_id,
                updated_status,
                updated_event,
                status_updated_at,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.dispute_id.0)
        .bind(&entry.payload_id.0)
        .bind(&entry.updated_status)
        .bind(&entry.updated_event)
        .bind(entry.status_updated_at.to_rfc3339())
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn list_for_dispute(
        &self,
        dispute_id: &DisputeId,
    ) -> Result<Vec<DisputeHistory>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                dispute_id,
                payload_id,
                updated_status,
                updated_event,
                status_updated_at,
                created_at
             FROM dispute_history
             WHERE dispute_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&dispute_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }
}

fn history_from_row(row: SqliteRow) -> Result<DisputeHistory, RepositoryError> {
    Ok(DisputeHistory {
        id: HistoryId(row.try_get("id")?),
        dispute_id: DisputeId(row.try_get("dispute_id")?),
        payload_id: PayloadId(row.try_get("payload_id")?),
        updated_status: row.try_get("updated_status")?,
        updated_event: row.try_get("updated_event")?,
        status_updated_at: parse_timestamp("status_updated_at", row.try_get("status_updated_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
