use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use disputary_core::domain::merchant::MerchantId;
use disputary_core::domain::staff::{StaffAssignmentState, StaffId};

use super::{parse_timestamp, AssignmentCursorStore, RepositoryError};
use crate::DbPool;

pub struct SqlAssignmentCursorStore {
    pool: DbPool,
}

impl SqlAssignmentCursorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AssignmentCursorStore for SqlAssignmentCursorStore {
    async fn find(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Option<StaffAssignmentState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT merchant_id, last_staff_assigned, updated_at
             FROM staff_assignment_state
             WHERE merchant_id = ?",
        )
        .bind(&merchant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(cursor_from_row).transpose()
    }

    async fn lock_and_read_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
        at: DateTime<Utc>,
    ) -> Result<StaffAssignmentState, RepositoryError> {
        // The upsert is a write, so the enclosing transaction holds the
        // database write lock from here until commit or rollback. A second
        // ingestion for the same merchant blocks on its own claim and then
        // observes the committed cursor.
        sqlx::query(
            "INSERT INTO staff_assignment_state (merchant_id, last_staff_assigned, updated_at)
             VALUES (?, NULL, ?)
             ON CONFLICT(merchant_id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(&merchant_id.0)
        .bind(at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query(
            "SELECT merchant_id, last_staff_assigned, updated_at
             FROM staff_assignment_state
             WHERE merchant_id = ?",
        )
        .bind(&merchant_id.0)
        .fetch_one(&mut *conn)
        .await?;

        cursor_from_row(row)
    }

    async fn write_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
        staff_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE staff_assignment_state
             SET last_staff_assigned = ?, updated_at = ?
             WHERE merchant_id = ?",
        )
        .bind(&staff_id.0)
        .bind(at.to_rfc3339())
        .bind(&merchant_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn cursor_from_row(row: SqliteRow) -> Result<StaffAssignmentState, RepositoryError> {
    Ok(StaffAssignmentState {
        merchant_id: MerchantId(row.try_get("merchant_id")?),
        last_staff_assigned: row.try_get::<Option<String>, _>("last_staff_assigned")?.map(StaffId),
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
