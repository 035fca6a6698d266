use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::merchant::MerchantId;
use crate::domain::payload::PayloadId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisputeLogId(pub String);

impl DisputeLogId {
    pub fn generate() -> Self {
        Self(format!("LOG-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Success,
    Failure,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// One row per ingestion attempt, success or failure. Written outside the
/// primary transaction so a rollback never erases it; identifying fields
/// are nullable because a failure can occur before they are known.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeLog {
    pub id: DisputeLogId,
    pub merchant_id: Option<MerchantId>,
    pub gateway: Option<String>,
    pub gateway_dispute_ref: Option<String>,
    pub payload_id: Option<PayloadId>,
    pub outcome: LogOutcome,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
