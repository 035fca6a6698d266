use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use disputary_core::domain::dispute::{Dispute, DisputeId, DisputeStage};
use disputary_core::domain::merchant::{BusinessId, MerchantId};
use disputary_core::domain::staff::StaffId;
use disputary_core::workflow::TransitionPlan;

use super::{
    parse_bool_int, parse_decimal, parse_optional_timestamp, parse_timestamp, DisputeRepository,
    RepositoryError,
};
use crate::DbPool;

const DISPUTE_COLUMNS: &str = "id,
    code,
    merchant_id,
    business_id,
    analyst_id,
    manager_id,
    gateway,
    gateway_dispute_ref,
    payment_ref,
    amount,
    currency,
    reason_code,
    reason_text,
    status,
    event,
    status_updated_at,
    due_date,
    stage,
    stage_updated_at,
    last_stage,
    last_stage_at,
    is_submitted,
    created_at,
    updated_at";

pub struct SqlDisputeRepository {
    pool: DbPool,
}

impl SqlDisputeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DisputeRepository for SqlDisputeRepository {
    async fn find_by_id(&self, id: &DisputeId) -> Result<Option<Dispute>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(dispute_from_row).transpose()
    }

    async fn count_for_merchant(&self, merchant_id: &MerchantId) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM disputes WHERE merchant_id = ?")
            .bind(&merchant_id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("count")?)
    }

    async fn find_by_idempotency_key_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
        gateway_dispute_ref: &str,
    ) -> Result<Option<Dispute>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DISPUTE_COLUMNS}
             FROM disputes
             WHERE merchant_id = ? AND gateway_dispute_ref = ?"
        ))
        .bind(&merchant_id.0)
        .bind(gateway_dispute_ref)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(dispute_from_row).transpose()
    }

    async fn insert_within(
        &self,
        conn: &mut SqliteConnection,
        dispute: &Dispute,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO disputes (
                id,
                code,
                merchant_id,
                business_id,
                analyst_id,
                manager_id,
                gateway,
                gateway_dispute_ref,
                payment_ref,
                amount,
                currency,
                reason_code,
                reason_text,
                status,
                event,
                status_updated_at,
                due_date,
                stage,
                stage_updated_at,
                last_stage,
                last_stage_at,
                is_submitted,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&dispute.id.0)
        .bind(&dispute.code)
        .bind(&dispute.merchant_id.0)
        .bind(&dispute.business_id.0)
        .bind(dispute.analyst_id.as_ref().map(|id| id.0.as_str()))
        .bind(dispute.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(&dispute.gateway)
        .bind(&dispute.gateway_dispute_ref)
        .bind(&dispute.payment_ref)
        .bind(dispute.amount.to_string())
        .bind(&dispute.currency)
        .bind(dispute.reason_code.as_deref())
        .bind(dispute.reason_text.as_deref())
        .bind(&dispute.status)
        .bind(&dispute.event)
        .bind(dispute.status_updated_at.to_rfc3339())
        .bind(dispute.due_date.map(|value| value.to_rfc3339()))
        .bind(dispute.stage.as_str())
        .bind(dispute.stage_updated_at.to_rfc3339())
        .bind(dispute.last_stage.map(|stage| stage.as_str()))
        .bind(dispute.last_stage_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(dispute.is_submitted))
        .bind(dispute.created_at.to_rfc3339())
        .bind(dispute.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn update_within(
        &self,
        conn: &mut SqliteConnection,
        dispute: &Dispute,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE disputes SET
                payment_ref = ?,
                amount = ?,
                currency = ?,
                reason_code = ?,
                reason_text = ?,
                status = ?,
                event = ?,
                status_updated_at = ?,
                due_date = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&dispute.payment_ref)
        .bind(dispute.amount.to_string())
        .bind(&dispute.currency)
        .bind(dispute.reason_code.as_deref())
        .bind(dispute.reason_text.as_deref())
        .bind(&dispute.status)
        .bind(&dispute.event)
        .bind(dispute.status_updated_at.to_rfc3339())
        .bind(dispute.due_date.map(|value| value.to_rfc3339()))
        .bind(dispute.updated_at.to_rfc3339())
        .bind(&dispute.id.0)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn assign_analyst_within(
        &self,
        conn: &mut SqliteConnection,
        id: &DisputeId,
        analyst_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE disputes SET analyst_id = ?, updated_at = ? WHERE id = ?")
            .bind(&analyst_id.0)
            .bind(at.to_rfc3339())
            .bind(&id.0)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn apply_transition_within(
        &self,
        conn: &mut SqliteConnection,
        id: &DisputeId,
        plan: &TransitionPlan,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        // SET expressions read the pre-update row, so last_stage captures
        // the stage being left and last_stage_at the instant it was entered.
        let result = if plan.records_last_stage {
            sqlx::query(
                "UPDATE disputes SET
                    last_stage = stage,
                    last_stage_at = stage_updated_at,
                    stage = ?,
                    stage_updated_at = ?,
                    is_submitted = CASE WHEN ? THEN 1 ELSE is_submitted END,
                    updated_at = ?
                 WHERE id = ? AND stage = ?",
            )
            .bind(plan.to.as_str())
            .bind(at.to_rfc3339())
            .bind(plan.marks_submitted)
            .bind(at.to_rfc3339())
            .bind(&id.0)
            .bind(plan.from.as_str())
            .execute(&mut *conn)
            .await?
        } else {
            sqlx::query(
                "UPDATE disputes SET stage_updated_at = ?, updated_at = ?
                 WHERE id = ? AND stage = ?",
            )
            .bind(at.to_rfc3339())
            .bind(at.to_rfc3339())
            .bind(&id.0)
            .bind(plan.from.as_str())
            .execute(&mut *conn)
            .await?
        };

        Ok(result.rows_affected() == 1)
    }
}

fn dispute_from_row(row: SqliteRow) -> Result<Dispute, RepositoryError> {
    let stage_raw = row.try_get::<String, _>("stage")?;
    let stage = DisputeStage::parse(&stage_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown dispute stage `{stage_raw}`")))?;

    let last_stage = row
        .try_get::<Option<String>, _>("last_stage")?
        .map(|value| {
            DisputeStage::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown last_stage `{value}`")))
        })
        .transpose()?;

    Ok(Dispute {
        id: DisputeId(row.try_get("id")?),
        code: row.try_get("code")?,
        merchant_id: MerchantId(row.try_get("merchant_id")?),
        business_id: BusinessId(row.try_get("business_id")?),
        analyst_id: row.try_get::<Option<String>, _>("analyst_id")?.map(StaffId),
        manager_id: row.try_get::<Option<String>, _>("manager_id")?.map(StaffId),
        gateway: row.try_get("gateway")?,
        gateway_dispute_ref: row.try_get("gateway_dispute_ref")?,
        payment_ref: row.try_get("payment_ref")?,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        currency: row.try_get("currency")?,
        reason_code: row.try_get("reason_code")?,
        reason_text: row.try_get("reason_text")?,
        status: row.try_get("status")?,
        event: row.try_get("event")?,
        status_updated_at: parse_timestamp("status_updated_at", row.try_get("status_updated_at")?)?,
        due_date: parse_optional_timestamp("due_date", row.try_get("due_date")?)?,
        stage,
        stage_updated_at: parse_timestamp("stage_updated_at", row.try_get("stage_updated_at")?)?,
        last_stage,
        last_stage_at: parse_optional_timestamp("last_stage_at", row.try_get("last_stage_at")?)?,
        is_submitted: parse_bool_int("is_submitted", row.try_get("is_submitted")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
