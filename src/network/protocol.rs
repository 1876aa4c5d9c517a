//! JSON hub protocol framing.
//!
//! Every record is a JSON object terminated by the ASCII record separator.
//! A single WebSocket text frame may carry several records.

use serde::Deserialize;
use serde_json::{Value, json};

pub const RECORD_SEPARATOR: char = '\u{1e}';

const TYPE_INVOCATION: u64 = 1;
const TYPE_STREAM_ITEM: u64 = 2;
const TYPE_COMPLETION: u64 = 3;
const TYPE_STREAM_INVOCATION: u64 = 4;
const TYPE_CANCEL_INVOCATION: u64 = 5;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed hub record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("hub record has no message type")]
    MissingType,
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Stream items, completions and the like; this client never invokes
    /// anything so they are only logged.
    Other(u64),
}

#[derive(Deserialize)]
struct RawInvocation {
    target: String,
    #[serde(default)]
    arguments: Vec<Value>,
}

#[derive(Deserialize)]
struct RawClose {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "allowReconnect")]
    allow_reconnect: bool,
}

#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

pub fn handshake_request() -> String {
    frame(&json!({ "protocol": "json", "version": 1 }))
}

pub fn ping() -> String {
    frame(&json!({ "type": TYPE_PING }))
}

fn frame(value: &Value) -> String {
    let mut out = value.to_string();
    out.push(RECORD_SEPARATOR);
    out
}

/// Split a text frame into its records, dropping the empty tail after the
/// last separator.
pub fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

pub fn parse_handshake(record: &str) -> Result<(), ProtocolError> {
    let response: HandshakeResponse = serde_json::from_str(record)?;
    match response.error {
        Some(error) => Err(ProtocolError::HandshakeRejected(error)),
        None => Ok(()),
    }
}

pub fn parse_message(record: &str) -> Result<HubMessage, ProtocolError> {
    let value: Value = serde_json::from_str(record)?;
    let kind = value
        .get("type")
        .and_then(Value::as_u64)
        .ok_or(ProtocolError::MissingType)?;

    let message = match kind {
        TYPE_INVOCATION => {
            let raw: RawInvocation = serde_json::from_value(value)?;
            HubMessage::Invocation {
                target: raw.target,
                arguments: raw.arguments,
            }
        }
        TYPE_PING => HubMessage::Ping,
        TYPE_CLOSE => {
            let raw: RawClose = serde_json::from_value(value)?;
            HubMessage::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect,
            }
        }
        TYPE_STREAM_ITEM | TYPE_COMPLETION | TYPE_STREAM_INVOCATION | TYPE_CANCEL_INVOCATION => {
            HubMessage::Other(kind)
        }
        unknown => {
            log::debug!("Ignoring hub record with unknown type {unknown}");
            HubMessage::Other(unknown)
        }
    };

    Ok(message)
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
