use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use disputary_core::CanonicalEventDraft;

const GATEWAY_HEADER: &str = "x-gateway";

/// Black-box gateway adaptation: names the gateway behind a delivery and
/// lifts its bytes into the loose canonical draft. `None` from either
/// method is a terminal ingestion failure for that envelope.
pub trait GatewayNormalizer: Send + Sync {
    fn detect(&self, headers: &BTreeMap<String, String>, body: &str) -> Option<String>;

    fn parse(&self, gateway: &str, body: &str) -> Option<CanonicalEventDraft>;
}

/// Normalizer for the canonical JSON wire shape: the gateway is named by
/// an `x-gateway` header or a top-level `"gateway"` field, and the event
/// fields arrive under their canonical names. Gateway-proprietary formats
/// live behind their own [`GatewayNormalizer`] implementations.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonNormalizer;

impl GatewayNormalizer for JsonNormalizer {
    fn detect(&self, headers: &BTreeMap<String, String>, body: &str) -> Option<String> {
        if let Some(named) = header_value(headers, GATEWAY_HEADER) {
            let named = named.trim();
            if !named.is_empty() {
                return Some(named.to_ascii_lowercase());
            }
        }

        let value: Value = serde_json::from_str(body).ok()?;
        let named = value.get("gateway")?.as_str()?.trim();
        if named.is_empty() {
            None
        } else {
            Some(named.to_ascii_lowercase())
        }
    }

    fn parse(&self, _gateway: &str, body: &str) -> Option<CanonicalEventDraft> {
        let value: Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;

        Some(CanonicalEventDraft {
            gateway_dispute_ref: string_field(object, "gateway_dispute_ref"),
            payment_ref: string_field(object, "payment_ref"),
            amount: decimal_field(object, "amount"),
            currency: string_field(object, "currency"),
            reason_code: string_field(object, "reason_code"),
            reason_text: string_field(object, "reason_text"),
            status: string_field(object, "status"),
            event: string_field(object, "event"),
            status_updated_at: timestamp_field(object, "status_updated_at"),
            due_date: timestamp_field(object, "due_date"),
        })
    }
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn string_field(object: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    let value = object.get(field)?.as_str()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn decimal_field(object: &serde_json::Map<String, Value>, field: &str) -> Option<Decimal> {
    match object.get(field)? {
        Value::String(raw) => Decimal::from_str(raw.trim()).ok(),
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        _ => None,
    }
}

fn timestamp_field(object: &serde_json::Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    let raw = object.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|timestamp| timestamp.with_timezone(&Utc))
}
