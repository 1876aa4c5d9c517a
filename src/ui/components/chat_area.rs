use chrono::{DateTime, Local};

use crate::common::Message;

pub fn render(message: &Message, received_at: DateTime<Local>) -> String {
    format!(
        "[{}] {}: {}",
        received_at.format("%H:%M:%S"),
        message.sender,
        message.body
    )
}
