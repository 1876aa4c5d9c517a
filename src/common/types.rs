use serde::{Deserialize, Serialize};

/// Domain model đại diện một tin nhắn chat.
///
/// Field names on the wire follow the hub's DTO (`user` / `msgText`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "user")]
    pub sender: String,
    #[serde(rename = "msgText")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("message body is required")]
    EmptyBody,
    #[error("sender is required")]
    EmptySender,
}

impl Message {
    /// Build an outbound message, rejecting blank senders and bodies.
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Result<Self, MessageError> {
        let sender = sender.into();
        let body = body.into();
        if sender.trim().is_empty() {
            return Err(MessageError::EmptySender);
        }
        if body.trim().is_empty() {
            return Err(MessageError::EmptyBody);
        }
        Ok(Self { sender, body })
    }
}
