use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::dispute::DisputeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn generate() -> Self {
        Self(format!("NTF-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    Merchant,
    Staff,
}

impl RecipientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merchant => "merchant",
            Self::Staff => "staff",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "merchant" => Some(Self::Merchant),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DisputeAssigned,
    DisputeReceived,
    DisputeStatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DisputeAssigned => "dispute_assigned",
            Self::DisputeReceived => "dispute_received",
            Self::DisputeStatusChanged => "dispute_status_changed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dispute_assigned" => Some(Self::DisputeAssigned),
            "dispute_received" => Some(Self::DisputeReceived),
            "dispute_status_changed" => Some(Self::DisputeStatusChanged),
            _ => None,
        }
    }
}

/// Composed but not yet persisted notification. The composer emits these;
/// the orchestrator assigns ids and writes them in one batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub recipient_kind: RecipientKind,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub dispute_id: DisputeId,
    pub recipient_kind: RecipientKind,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
