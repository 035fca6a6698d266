use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use disputary_core::domain::merchant::MerchantId;
use disputary_core::domain::staff::{Staff, StaffId, StaffRole};

use super::{parse_bool_int, parse_timestamp, RepositoryError, StaffRosterRepository};

#[derive(Default)]
pub struct SqlStaffRosterRepository;

impl SqlStaffRosterRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl StaffRosterRepository for SqlStaffRosterRepository {
    async fn active_analysts_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
    ) -> Result<Vec<Staff>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, merchant_id, name, role, is_active, created_at
             FROM staff
             WHERE merchant_id = ? AND is_active = 1 AND role = 'analyst'
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&merchant_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(staff_from_row).collect()
    }
}

fn staff_from_row(row: SqliteRow) -> Result<Staff, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = StaffRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown staff role `{role_raw}`")))?;

    Ok(Staff {
        id: StaffId(row.try_get("id")?),
        merchant_id: MerchantId(row.try_get("merchant_id")?),
        name: row.try_get("name")?,
        role,
        is_active: parse_bool_int("is_active", row.try_get("is_active")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
