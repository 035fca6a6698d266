use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::merchant::{BusinessId, MerchantId};
use crate::domain::payload::PayloadId;
use crate::domain::staff::StaffId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisputeId(pub String);

impl DisputeId {
    pub fn generate() -> Self {
        Self(format!("DSP-{}", Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for DisputeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub String);

impl HistoryId {
    pub fn generate() -> Self {
        Self(format!("HIS-{}", Uuid::new_v4().simple()))
    }
}

/// Staff-review lifecycle position. `Pending` is the sole entry state and
/// `Accepted` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStage {
    Pending,
    Submitted,
    Accepted,
    Rejected,
    Resubmitted,
}

impl DisputeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Submitted => "SUBMITTED",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Resubmitted => "RESUBMITTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "SUBMITTED" => Some(Self::Submitted),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            "RESUBMITTED" => Some(Self::Resubmitted),
            _ => None,
        }
    }
}

/// One chargeback record. At most one exists per
/// (merchant, gateway dispute reference); `code` is the human-facing
/// reference printed in notifications and dashboards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub code: String,
    pub merchant_id: MerchantId,
    pub business_id: BusinessId,
    pub analyst_id: Option<StaffId>,
    pub manager_id: Option<StaffId>,
    pub gateway: String,
    pub gateway_dispute_ref: String,
    pub payment_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub reason_code: Option<String>,
    pub reason_text: Option<String>,
    pub status: String,
    pub event: String,
    pub status_updated_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub stage: DisputeStage,
    pub stage_updated_at: DateTime<Utc>,
    pub last_stage: Option<DisputeStage>,
    pub last_stage_at: Option<DateTime<Utc>>,
    pub is_submitted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    pub fn generate_code() -> String {
        format!("CB-{}", Uuid::new_v4().simple())
    }
}

/// Append-only record of one webhook application against a dispute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeHistory {
    pub id: HistoryId,
    pub dispute_id: DisputeId,
    pub payload_id: PayloadId,
    pub updated_status: String,
    pub updated_event: String,
    pub status_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Rejection feedback, keyed by dispute. Re-rejecting overwrites the
/// prior record rather than appending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeFeedback {
    pub dispute_id: DisputeId,
    pub reason: String,
    pub comments: Option<String>,
    pub evidence_files: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{Dispute, DisputeId, DisputeStage};

    #[test]
    fn stage_round_trips_from_storage_encoding() {
        let cases = [
            DisputeStage::Pending,
            DisputeStage::Submitted,
            DisputeStage::Accepted,
            DisputeStage::Rejected,
            DisputeStage::Resubmitted,
        ];

        for stage in cases {
            let decoded = DisputeStage::parse(stage.as_str());
            assert_eq!(decoded, Some(stage));
        }
    }

    #[test]
    fn stage_parse_is_case_insensitive() {
        assert_eq!(DisputeStage::parse(" pending "), Some(DisputeStage::Pending));
        assert_eq!(DisputeStage::parse("resubmitted"), Some(DisputeStage::Resubmitted));
        assert_eq!(DisputeStage::parse("unknown"), None);
    }

    #[test]
    fn generated_identifiers_carry_entity_prefixes() {
        assert!(DisputeId::generate().0.starts_with("DSP-"));
        assert!(Dispute::generate_code().starts_with("CB-"));
    }
}
