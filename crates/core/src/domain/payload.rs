use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadId(pub String);

impl PayloadId {
    pub fn generate() -> Self {
        Self(format!("PAY-{}", Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for PayloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw webhook delivery as it arrived, before any parsing is trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub business_ref: String,
    pub headers: BTreeMap<String, String>,
    pub sender_ip: Option<String>,
    pub body: String,
}

/// Durable copy of an [`InboundEnvelope`], written once per webhook call
/// regardless of whether later processing succeeds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub id: PayloadId,
    pub business_ref: String,
    pub headers: BTreeMap<String, String>,
    pub sender_ip: Option<String>,
    pub body: String,
    pub received_at: DateTime<Utc>,
}
