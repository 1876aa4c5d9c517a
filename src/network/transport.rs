use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::AppConfig;

use super::error::HubError;
use super::protocol::{self, HubMessage};

const MAX_NEGOTIATE_REDIRECTS: usize = 100;
const WEBSOCKETS_TRANSPORT: &str = "WebSockets";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one hub session per call. The connection manager owns exactly one
/// connector and calls it from a single loop.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Session>, HubError>;
}

/// A live hub connection.
#[async_trait]
pub trait Session: Send {
    /// Next inbound hub message; `None` once the connection is gone.
    async fn next_message(&mut self) -> Option<HubMessage>;
}

pub struct HubConnector {
    http: reqwest::Client,
    hub_url: String,
    skip_negotiation: bool,
    keep_alive: Duration,
    server_timeout: Duration,
}

#[derive(Debug, PartialEq)]
struct Endpoint {
    url: String,
    connection_token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    connection_token: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    available_transports: Vec<AvailableTransport>,
}

#[derive(Debug, Deserialize)]
struct AvailableTransport {
    transport: String,
}

impl HubConnector {
    pub fn new(http: reqwest::Client, config: &AppConfig) -> Self {
        Self {
            http,
            hub_url: config.hub_url.clone(),
            skip_negotiation: config.skip_negotiation,
            keep_alive: config.keep_alive(),
            server_timeout: config.server_timeout(),
        }
    }

    async fn negotiate(&self) -> Result<Endpoint, HubError> {
        let mut url = self.hub_url.clone();
        let mut access_token: Option<String> = None;

        for _ in 0..MAX_NEGOTIATE_REDIRECTS {
            let mut request = self.http.post(negotiate_url(&url)?);
            if let Some(token) = &access_token {
                request = request.bearer_auth(token);
            }
            let response: NegotiateResponse =
                request.send().await?.error_for_status()?.json().await?;

            if let Some(error) = response.error {
                return Err(HubError::Negotiate(error));
            }
            if let Some(redirect) = response.url {
                log::debug!("Negotiate redirected to {redirect}");
                url = redirect;
                access_token = response.access_token;
                continue;
            }
            if !response
                .available_transports
                .iter()
                .any(|t| t.transport == WEBSOCKETS_TRANSPORT)
            {
                return Err(HubError::NoWebSockets);
            }

            return Ok(Endpoint {
                url,
                connection_token: response.connection_token.or(response.connection_id),
                access_token,
            });
        }

        Err(HubError::TooManyRedirects(MAX_NEGOTIATE_REDIRECTS))
    }
}

#[async_trait]
impl Connector for HubConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, HubError> {
        let endpoint = if self.skip_negotiation {
            Endpoint {
                url: self.hub_url.clone(),
                connection_token: None,
                access_token: None,
            }
        } else {
            self.negotiate().await?
        };

        let ws_url = websocket_url(&endpoint.url, endpoint.connection_token.as_deref())?;
        let mut request = ws_url.as_str().into_client_request()?;
        if let Some(token) = &endpoint.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| HubError::InvalidUrl(endpoint.url.clone()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        log::debug!("Opening hub socket {ws_url}");
        let (stream, _response) = connect_async(request).await?;
        let session = HubSession::handshake(stream, self.keep_alive, self.server_timeout).await?;
        Ok(Box::new(session))
    }
}

pub struct HubSession {
    write: SplitSink<WsStream, WsMessage>,
    read: SplitStream<WsStream>,
    pending: VecDeque<String>,
    keep_alive: Interval,
    server_timeout: Duration,
    last_received: Instant,
}

impl HubSession {
    async fn handshake(
        stream: WsStream,
        keep_alive: Duration,
        server_timeout: Duration,
    ) -> Result<Self, HubError> {
        let (mut write, mut read) = stream.split();
        write
            .send(WsMessage::Text(protocol::handshake_request().into()))
            .await?;

        let mut pending = VecDeque::new();
        loop {
            let frame = timeout(server_timeout, read.next())
                .await
                .map_err(|_| HubError::HandshakeTimeout)?;
            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let mut records = protocol::split_records(text.as_str());
                    let Some(first) = records.next() else {
                        continue;
                    };
                    protocol::parse_handshake(first)?;
                    // The hub may batch its first messages behind the handshake.
                    pending.extend(records.map(str::to_string));
                    break;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(HubError::ClosedDuringHandshake);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            }
        }

        let mut keep_alive = interval_at(Instant::now() + keep_alive, keep_alive);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            write,
            read,
            pending,
            keep_alive,
            server_timeout,
            last_received: Instant::now(),
        })
    }
}

#[async_trait]
impl Session for HubSession {
    async fn next_message(&mut self) -> Option<HubMessage> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                match protocol::parse_message(&record) {
                    Ok(message) => return Some(message),
                    Err(err) => {
                        log::warn!("Dropping hub record: {err}");
                        continue;
                    }
                }
            }

            let deadline = self.last_received + self.server_timeout;
            tokio::select! {
                frame = self.read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        self.last_received = Instant::now();
                        self.pending
                            .extend(protocol::split_records(text.as_str()).map(str::to_string));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        log::info!("Hub closed the socket: {frame:?}");
                        return None;
                    }
                    Some(Ok(_)) => {
                        self.last_received = Instant::now();
                    }
                    Some(Err(err)) => {
                        log::warn!("Hub socket error: {err}");
                        return None;
                    }
                    None => return None,
                },
                _ = self.keep_alive.tick() => {
                    if let Err(err) = self.write.send(WsMessage::Text(protocol::ping().into())).await {
                        log::warn!("Failed to send keep-alive ping: {err}");
                        return None;
                    }
                }
                () = sleep_until(deadline) => {
                    log::warn!(
                        "No message from hub within {:?}; dropping connection",
                        self.server_timeout
                    );
                    return None;
                }
            }
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, HubError> {
    Url::parse(raw).map_err(|err| HubError::InvalidUrl(format!("{raw}: {err}")))
}

fn negotiate_url(hub_url: &str) -> Result<Url, HubError> {
    let mut url = parse_url(hub_url)?;
    let path = format!("{}/negotiate", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    Ok(url)
}

fn websocket_url(hub_url: &str, connection_token: Option<&str>) -> Result<Url, HubError> {
    let mut url = parse_url(hub_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(HubError::InvalidUrl(hub_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| HubError::InvalidUrl(hub_url.to_string()))?;
    if let Some(token) = connection_token {
        url.query_pairs_mut().append_pair("id", token);
    }
    Ok(url)
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
