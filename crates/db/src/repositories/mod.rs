use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use thiserror::Error;

use disputary_core::domain::dispute::{Dispute, DisputeFeedback, DisputeHistory, DisputeId};
use disputary_core::domain::log::DisputeLog;
use disputary_core::domain::merchant::{Business, Merchant, MerchantId};
use disputary_core::domain::notification::Notification;
use disputary_core::domain::payload::{Payload, PayloadId};
use disputary_core::domain::staff::{Staff, StaffAssignmentState, StaffId};
use disputary_core::workflow::TransitionPlan;

pub mod assignment_cursor;
pub mod dispute;
pub mod dispute_log;
pub mod feedback;
pub mod history;
pub mod merchant;
pub mod notification;
pub mod payload;
pub mod staff;

pub use assignment_cursor::SqlAssignmentCursorStore;
pub use dispute::SqlDisputeRepository;
pub use dispute_log::SqlDisputeLogRepository;
pub use feedback::SqlDisputeFeedbackRepository;
pub use history::SqlDisputeHistoryRepository;
pub use merchant::SqlMerchantDirectory;
pub use notification::SqlNotificationRepository;
pub use payload::SqlPayloadRepository;
pub use staff::SqlStaffRosterRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// True when the underlying driver reported a UNIQUE constraint
    /// violation, the losing side of a create/create race.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            RepositoryError::Database(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    }
}

/// Methods suffixed `_within` participate in a transaction owned by the
/// caller and never commit or roll back themselves.
#[async_trait]
pub trait DisputeRepository: Send + Sync {
    async fn find_by_id(&self, id: &DisputeId) -> Result<Option<Dispute>, RepositoryError>;

    async fn count_for_merchant(&self, merchant_id: &MerchantId) -> Result<i64, RepositoryError>;

    /// Idempotency resolution: the `(merchant_id, gateway_dispute_ref)`
    /// pair identifies a dispute for its whole lifetime.
    async fn find_by_idempotency_key_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
        gateway_dispute_ref: &str,
    ) -> Result<Option<Dispute>, RepositoryError>;

    async fn insert_within(
        &self,
        conn: &mut SqliteConnection,
        dispute: &Dispute,
    ) -> Result<(), RepositoryError>;

    /// Applies the event-mutable fields of a later webhook to an existing
    /// dispute. Workflow stage fields and assignment are never touched here.
    async fn update_within(
        &self,
        conn: &mut SqliteConnection,
        dispute: &Dispute,
    ) -> Result<(), RepositoryError>;

    async fn assign_analyst_within(
        &self,
        conn: &mut SqliteConnection,
        id: &DisputeId,
        analyst_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Single UPDATE guarded on the expected current stage. Returns false
    /// when the guard misses, i.e. a concurrent transition won.
    async fn apply_transition_within(
        &self,
        conn: &mut SqliteConnection,
        id: &DisputeId,
        plan: &TransitionPlan,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait DisputeHistoryRepository: Send + Sync {
    async fn append_within(
        &self,
        conn: &mut SqliteConnection,
        entry: &DisputeHistory,
    ) -> Result<(), RepositoryError>;

    async fn list_for_dispute(
        &self,
        dispute_id: &DisputeId,
    ) -> Result<Vec<DisputeHistory>, RepositoryError>;
}

#[async_trait]
pub trait PayloadRepository: Send + Sync {
    /// Runs on its own connection so the stored envelope survives a
    /// rollback of the ingestion transaction.
    async fn insert(&self, payload: &Payload) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &PayloadId) -> Result<Option<Payload>, RepositoryError>;
}

#[async_trait]
pub trait AssignmentCursorStore: Send + Sync {
    async fn find(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Option<StaffAssignmentState>, RepositoryError>;

    /// Claims the merchant's cursor row for the enclosing transaction and
    /// returns its current state. The claim is an upsert, so the row exists
    /// afterwards and its write lock is held until commit or rollback;
    /// concurrent ingestions for the same merchant serialize here.
    async fn lock_and_read_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
        at: DateTime<Utc>,
    ) -> Result<StaffAssignmentState, RepositoryError>;

    async fn write_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
        staff_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_batch_within(
        &self,
        conn: &mut SqliteConnection,
        notifications: &[Notification],
    ) -> Result<(), RepositoryError>;

    async fn list_for_dispute(
        &self,
        dispute_id: &DisputeId,
    ) -> Result<Vec<Notification>, RepositoryError>;
}

#[async_trait]
pub trait DisputeLogRepository: Send + Sync {
    /// Always called outside the ingestion transaction.
    async fn record(&self, log: &DisputeLog) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DisputeFeedbackRepository: Send + Sync {
    /// Re-rejecting an already rejected dispute overwrites the prior
    /// feedback rather than appending.
    async fn upsert_within(
        &self,
        conn: &mut SqliteConnection,
        feedback: &DisputeFeedback,
    ) -> Result<(), RepositoryError>;

    async fn find_by_dispute(
        &self,
        dispute_id: &DisputeId,
    ) -> Result<Option<DisputeFeedback>, RepositoryError>;
}

#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn find_by_registration_ref(
        &self,
        registration_ref: &str,
    ) -> Result<Option<Business>, RepositoryError>;

    async fn find_merchant(&self, id: &MerchantId)
        -> Result<Option<Merchant>, RepositoryError>;

    async fn increment_dispute_count_within(
        &self,
        conn: &mut SqliteConnection,
        id: &MerchantId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait StaffRosterRepository: Send + Sync {
    /// Active analysts ordered by creation time ascending, id ascending as
    /// tie-break. This ordering is the round-robin domain contract.
    async fn active_analysts_within(
        &self,
        conn: &mut SqliteConnection,
        merchant_id: &MerchantId,
    ) -> Result<Vec<Staff>, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    use std::str::FromStr;

    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_bool_int(column: &str, value: i64) -> Result<bool, RepositoryError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepositoryError::Decode(format!(
            "invalid boolean in `{column}`: {other}"
        ))),
    }
}
