use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventValidationError {
    #[error("canonical event is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("canonical event amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
}

/// Loosely-typed output of the gateway normalizer, before the fixed
/// schema has been enforced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEventDraft {
    pub gateway_dispute_ref: Option<String>,
    pub payment_ref: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub reason_code: Option<String>,
    pub reason_text: Option<String>,
    pub status: Option<String>,
    pub event: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Validated gateway event, the only shape ingestion trusts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub gateway: String,
    pub gateway_dispute_ref: String,
    pub payment_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub reason_code: Option<String>,
    pub reason_text: Option<String>,
    pub status: String,
    pub event: String,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl CanonicalEventDraft {
    /// Enforces the required-field schema; the first violation wins so the
    /// audit log carries one actionable message.
    pub fn validate(self, gateway: String) -> Result<CanonicalEvent, EventValidationError> {
        let gateway_dispute_ref = required(self.gateway_dispute_ref, "gateway_dispute_ref")?;
        let payment_ref = required(self.payment_ref, "payment_ref")?;
        let amount = self.amount.ok_or(EventValidationError::MissingField("amount"))?;
        if amount <= Decimal::ZERO {
            return Err(EventValidationError::NonPositiveAmount(amount));
        }
        let currency = required(self.currency, "currency")?;
        let status = required(self.status, "status")?;
        let event = required(self.event, "event")?;

        Ok(CanonicalEvent {
            gateway,
            gateway_dispute_ref,
            payment_ref,
            amount,
            currency,
            reason_code: self.reason_code,
            reason_text: self.reason_text,
            status,
            event,
            status_updated_at: self.status_updated_at,
            due_date: self.due_date,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, EventValidationError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(EventValidationError::MissingField(field)),
    }
}
