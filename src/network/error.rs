use super::protocol::ProtocolError;

/// Why a connection attempt to the hub failed.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("invalid hub url `{0}`")]
    InvalidUrl(String),
    #[error("negotiate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hub refused negotiation: {0}")]
    Negotiate(String),
    #[error("hub does not offer a WebSockets transport")]
    NoWebSockets,
    #[error("negotiate redirected more than {0} times")]
    TooManyRedirects(usize),
    #[error("websocket connect failed: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("hub handshake failed: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("hub closed the socket during the handshake")]
    ClosedDuringHandshake,
    #[error("timed out waiting for the hub handshake")]
    HandshakeTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for HubError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Why an outbound message could not be delivered to the broadcast endpoint.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("broadcast request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("broadcast endpoint answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}
