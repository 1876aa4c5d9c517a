use crate::common::Message;

/// Trạng thái cục bộ của UI.
pub struct AppState {
    pub messages: Vec<Message>,
    pub sender: String,
}

impl AppState {
    pub fn new(sender: String) -> Self {
        Self {
            messages: Vec::new(),
            sender,
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }
}
