//! Inbound WhatsApp webhook events.
//!
//! Payloads are walked as `serde_json::Value` rather than deserialized into
//! fixed structs so a missing field can be reported by name.
//!
//! ```text
//! { "entry": [ { "changes": [ { "value": {
//!     "metadata": { "phone_number_id": "..." },
//!     "statuses": [ ... ]                      // delivery receipts
//!     "messages": [ { "from", "type", "text": { "body" } | "audio": { "id" } } ]
//! } } ] } ] }
//! ```

use serde_json::Value;

use crate::error::RelayError;

/// Classified webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Sent/delivered/read receipts; nothing to answer.
    Status { count: usize },
    /// A user message.
    Message(IncomingMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Sender's WhatsApp id (phone number)
    pub from: String,
    /// WhatsApp message id, when present
    pub id: Option<String>,
    /// Business number that received the message (`metadata.phone_number_id`)
    pub phone_number_id: Option<String>,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Audio {
        media_id: String,
        mime_type: Option<String>,
    },
    /// Any other message type (image, sticker, location, ...).
    Unsupported(String),
}

/// Parse the raw body.
///
/// Returns `Ok(None)` for bodies without content: empty or whitespace-only,
/// or a falsy JSON value (`null`, `false`, `0`, `""`, `[]`, `{}`).
pub fn parse_body(body: &[u8]) -> Result<Option<Value>, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(body).map_err(RelayError::InvalidJson)?;

    let is_empty = match &value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    };

    Ok((!is_empty).then_some(value))
}

/// Classify a parsed payload.
///
/// Status receipts win over messages. A payload with neither a status nor a
/// message at `entry[0].changes[0].value` is not a WhatsApp event.
pub fn classify(payload: &Value) -> Result<InboundEvent, RelayError> {
    let value = change_value(payload);

    let statuses = value
        .and_then(|v| v.get("statuses"))
        .and_then(Value::as_array)
        .filter(|s| !s.is_empty());
    if let Some(statuses) = statuses {
        return Ok(InboundEvent::Status {
            count: statuses.len(),
        });
    }

    let (Some(value), Some(message)) = (value, first_message(value)) else {
        return Err(RelayError::UnrecognizedEvent);
    };

    let from = required_str(message, "from")?;
    let kind = required_str(message, "type")?;

    let content = match kind {
        "text" => {
            let text = required(message, "text")?;
            MessageContent::Text(required_str(text, "body")?.to_string())
        }
        "audio" => {
            let audio = required(message, "audio")?;
            MessageContent::Audio {
                media_id: required_str(audio, "id")?.to_string(),
                mime_type: audio
                    .get("mime_type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }
        }
        other => MessageContent::Unsupported(other.to_string()),
    };

    let phone_number_id = value
        .get("metadata")
        .and_then(|m| m.get("phone_number_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(InboundEvent::Message(IncomingMessage {
        from: from.to_string(),
        id: message.get("id").and_then(Value::as_str).map(str::to_string),
        phone_number_id,
        content,
    }))
}

fn change_value(payload: &Value) -> Option<&Value> {
    payload
        .get("entry")?
        .as_array()?
        .first()?
        .get("changes")?
        .as_array()?
        .first()?
        .get("value")
}

fn first_message(value: Option<&Value>) -> Option<&Value> {
    value?.get("messages")?.as_array()?.first()
}

fn required<'a>(value: &'a Value, key: &'static str) -> Result<&'a Value, RelayError> {
    value
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or(RelayError::MissingKey(key))
}

fn required_str<'a>(value: &'a Value, key: &'static str) -> Result<&'a str, RelayError> {
    required(value, key)?
        .as_str()
        .ok_or(RelayError::MissingKey(key))
}
