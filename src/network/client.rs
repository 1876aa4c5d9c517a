use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::common::Message;
use crate::config::AppConfig;

use super::error::SendError;
use super::protocol::HubMessage;
use super::transport::{Connector, HubConnector, Session};

/// Owns the single hub connection for the lifetime of the app.
///
/// Inbound push events are fanned out to every subscriber; outbound
/// messages go to the broadcast endpoint as a plain POST.
pub struct ChatService {
    connector: Arc<dyn Connector>,
    http: reqwest::Client,
    broadcast_url: String,
    event_name: String,
    retry_delay: Duration,
    inbound: broadcast::Sender<Message>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatService {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::new();
        let connector = HubConnector::new(http.clone(), config);
        Self::with_connector(Arc::new(connector), http, config)
    }

    pub fn with_connector(
        connector: Arc<dyn Connector>,
        http: reqwest::Client,
        config: &AppConfig,
    ) -> Self {
        let (inbound, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            connector,
            http,
            broadcast_url: config.broadcast_url.clone(),
            event_name: config.event_name.clone(),
            retry_delay: config.retry_delay(),
            inbound,
            connection_task: Mutex::new(None),
        }
    }

    /// Spawn the connection loop. Later calls while it runs do nothing, so
    /// there is never more than one reconnect sequence in flight.
    pub fn start(&self) {
        let mut task = match self.connection_task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            log::debug!("Hub connection loop already running");
            return;
        }

        let connection = ConnectionLoop {
            connector: Arc::clone(&self.connector),
            inbound: self.inbound.clone(),
            event_name: self.event_name.clone(),
            retry_delay: self.retry_delay,
        };
        *task = Some(tokio::spawn(connection.run()));
    }

    /// Abort the connection loop. Subscribers stay open but go quiet.
    pub fn stop(&self) {
        let task = match self.connection_task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = task {
            handle.abort();
            log::info!("Hub connection loop stopped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.inbound.subscribe()
    }

    /// Fire-and-forget publish. The outcome is only logged; the handle is
    /// there for callers that want to wait for it.
    pub fn send(&self, message: Message) -> JoinHandle<()> {
        let http = self.http.clone();
        let url = self.broadcast_url.clone();
        tokio::spawn(async move {
            match post_message(&http, &url, &message).await {
                Ok(body) => log::info!("Message sent: {body}"),
                Err(err) => log::warn!("Failed to send message from {}: {err}", message.sender),
            }
        })
    }

    /// One POST of `message` to the broadcast endpoint, no retry.
    pub async fn post(&self, message: &Message) -> Result<String, SendError> {
        post_message(&self.http, &self.broadcast_url, message).await
    }
}

impl Drop for ChatService {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn post_message(
    http: &reqwest::Client,
    url: &str,
    message: &Message,
) -> Result<String, SendError> {
    let response = http.post(url).json(message).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(SendError::Status { status, body });
    }
    Ok(body)
}

struct ConnectionLoop {
    connector: Arc<dyn Connector>,
    inbound: broadcast::Sender<Message>,
    event_name: String,
    retry_delay: Duration,
}

impl ConnectionLoop {
    async fn run(self) {
        loop {
            match self.connector.connect().await {
                Ok(mut session) => {
                    log::info!("Connected to hub");
                    self.pump(session.as_mut()).await;
                    log::info!("Hub connection closed; reconnecting");
                }
                Err(err) => {
                    log::warn!(
                        "Hub connection failed: {err}; retrying in {}s",
                        self.retry_delay.as_secs_f32()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Relay inbound events until the session ends.
    async fn pump(&self, session: &mut dyn Session) {
        while let Some(message) = session.next_message().await {
            match message {
                HubMessage::Invocation { target, arguments } => {
                    if target.eq_ignore_ascii_case(&self.event_name) {
                        self.on_inbound_event(&arguments);
                    } else {
                        log::debug!("No handler for hub event `{target}`");
                    }
                }
                HubMessage::Ping => {}
                HubMessage::Close {
                    error,
                    allow_reconnect,
                } => {
                    match error {
                        Some(error) => log::warn!("Hub closed the connection: {error}"),
                        None => log::info!("Hub closed the connection"),
                    }
                    if !allow_reconnect {
                        log::debug!("Hub did not ask for a reconnect; reconnecting anyway");
                    }
                    return;
                }
                HubMessage::Other(kind) => log::debug!("Ignoring hub message type {kind}"),
            }
        }
    }

    fn on_inbound_event(&self, arguments: &[Value]) {
        let [sender, body] = arguments else {
            log::warn!(
                "Expected (sender, body) for `{}`, got {} arguments",
                self.event_name,
                arguments.len()
            );
            return;
        };
        let (Some(sender), Some(body)) = (sender.as_str(), body.as_str()) else {
            log::warn!("Non-text arguments for `{}`: {arguments:?}", self.event_name);
            return;
        };

        let message = Message {
            sender: sender.to_string(),
            body: body.to_string(),
        };
        // Không có subscriber thì bỏ qua tin nhắn
        if self.inbound.send(message).is_err() {
            log::debug!("Inbound message dropped: no subscribers");
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
