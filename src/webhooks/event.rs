//! Webhook event parsing.
//!
//! Providers are sloppy about event payload shapes, so parsing is
//! deliberately tolerant: the type and a data object are required,
//! everything else is best effort.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Why an event payload could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("malformed event payload: {message}")]
    Malformed { message: String },
    #[error("event payload has no type field")]
    MissingType,
    #[error("event payload has no data object")]
    MissingData,
}

/// A parsed inbound webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// Normalized event type, e.g. `subscription.updated`.
    pub event_type: String,
    /// The event's data object, shape left to the handler.
    pub data: Value,
    pub event_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub merchant_id: Option<String>,
}

impl WebhookEvent {
    /// Parse an event from a JSON string.
    pub fn parse(body: &str) -> Result<Self, EventParseError> {
        let value: Value = serde_json::from_str(body).map_err(|e| EventParseError::Malformed {
            message: e.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Parse an event from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, EventParseError> {
        let Value::Object(map) = value else {
            return Err(EventParseError::Malformed {
                message: "event payload is not a JSON object".to_string(),
            });
        };

        let raw_type = map
            .get("type")
            .or_else(|| map.get("event_type"))
            .and_then(Value::as_str)
            .ok_or(EventParseError::MissingType)?;
        let event_type = normalize_event_type(raw_type);
        if event_type.is_empty() {
            return Err(EventParseError::MissingType);
        }

        let data = map
            .get("data")
            .cloned()
            .filter(|d| d.is_object())
            .ok_or(EventParseError::MissingData)?;

        Ok(Self {
            event_type,
            data,
            event_id: map
                .get("event_id")
                .or_else(|| map.get("id"))
                .and_then(Value::as_str)
                .map(String::from),
            created_at: map.get("created_at").and_then(parse_timestamp),
            merchant_id: map
                .get("merchant_id")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    /// Subscription identifier referenced by this event, if any.
    #[must_use]
    pub fn subscription_id(&self) -> Option<&str> {
        self.nested_id("subscription")
    }

    /// Customer identifier referenced by this event, if any.
    #[must_use]
    pub fn customer_id(&self) -> Option<&str> {
        self.data
            .pointer("/object/customer_id")
            .or_else(|| self.data.get("customer_id"))
            .and_then(Value::as_str)
    }

    /// Payment identifier referenced by this event, if any.
    #[must_use]
    pub fn payment_id(&self) -> Option<&str> {
        self.nested_id("payment")
    }

    /// Look for `data.object.<kind>.id`, then `data.<kind>_id`, then fall
    /// back to `data.object.id` / `data.id` when the event type names the
    /// kind.
    fn nested_id(&self, kind: &str) -> Option<&str> {
        if let Some(id) = self
            .data
            .pointer(&format!("/object/{}/id", kind))
            .and_then(Value::as_str)
        {
            return Some(id);
        }
        if let Some(id) = self
            .data
            .get(format!("{}_id", kind))
            .and_then(Value::as_str)
        {
            return Some(id);
        }
        if self.event_type.starts_with(kind) {
            return self
                .data
                .pointer("/object/id")
                .or_else(|| self.data.get("id"))
                .and_then(Value::as_str);
        }
        None
    }
}

/// Normalize a raw event type: lowercase, with every run of
/// non-alphanumeric characters collapsed to a single dot and the ends
/// trimmed. `Subscription::Updated!` becomes `subscription.updated`.
#[must_use]
pub fn normalize_event_type(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dot = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_dot && !out.is_empty() {
                out.push('.');
            }
            pending_dot = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dot = true;
        }
    }
    out
}

/// RFC 3339 string or unix seconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}
