use super::*;
use axum::Router;
use axum::extract::Query;
use axum::http::HeaderMap;
use axum::routing::post;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

fn config_for(hub_url: String, skip_negotiation: bool) -> AppConfig {
    AppConfig {
        hub_url,
        skip_negotiation,
        ..AppConfig::default()
    }
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[test]
fn negotiate_url_appends_path_and_version() {
    let url = negotiate_url("https://example.com/chatsocket/").unwrap();
    assert_eq!(
        url.as_str(),
        "https://example.com/chatsocket/negotiate?negotiateVersion=1"
    );

    let url = negotiate_url("https://example.com/chatsocket?room=a").unwrap();
    assert_eq!(
        url.as_str(),
        "https://example.com/chatsocket/negotiate?room=a&negotiateVersion=1"
    );
}

#[test]
fn websocket_url_swaps_scheme_and_adds_token() {
    let url = websocket_url("https://example.com/chatsocket", Some("abc")).unwrap();
    assert_eq!(url.as_str(), "wss://example.com/chatsocket?id=abc");

    let url = websocket_url("http://127.0.0.1:5000/chatsocket", None).unwrap();
    assert_eq!(url.as_str(), "ws://127.0.0.1:5000/chatsocket");

    assert!(matches!(
        websocket_url("ftp://example.com/hub", None),
        Err(HubError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn negotiate_returns_connection_token() {
    let router = Router::new().route(
        "/chatsocket/negotiate",
        post(|Query(query): Query<HashMap<String, String>>| async move {
            assert_eq!(query.get("negotiateVersion").map(String::as_str), Some("1"));
            axum::Json(json!({
                "negotiateVersion": 1,
                "connectionId": "conn-id",
                "connectionToken": "conn-token",
                "availableTransports": [
                    { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] },
                    { "transport": "LongPolling", "transferFormats": ["Text", "Binary"] }
                ]
            }))
        }),
    );
    let base = serve(router).await;
    let hub_url = format!("{base}/chatsocket");

    let connector = HubConnector::new(reqwest::Client::new(), &config_for(hub_url.clone(), false));
    let endpoint = connector.negotiate().await.unwrap();
    assert_eq!(
        endpoint,
        Endpoint {
            url: hub_url,
            connection_token: Some("conn-token".into()),
            access_token: None,
        }
    );
}

#[tokio::test]
async fn negotiate_rejects_hub_without_websockets() {
    let router = Router::new().route(
        "/chatsocket/negotiate",
        post(|| async {
            axum::Json(json!({
                "connectionId": "conn-id",
                "availableTransports": [{ "transport": "LongPolling", "transferFormats": ["Text"] }]
            }))
        }),
    );
    let base = serve(router).await;

    let connector =
        HubConnector::new(reqwest::Client::new(), &config_for(format!("{base}/chatsocket"), false));
    assert!(matches!(connector.negotiate().await, Err(HubError::NoWebSockets)));
}

#[tokio::test]
async fn negotiate_surfaces_hub_error() {
    let router = Router::new().route(
        "/chatsocket/negotiate",
        post(|| async { axum::Json(json!({ "error": "hub is draining" })) }),
    );
    let base = serve(router).await;

    let connector =
        HubConnector::new(reqwest::Client::new(), &config_for(format!("{base}/chatsocket"), false));
    match connector.negotiate().await {
        Err(HubError::Negotiate(msg)) => assert_eq!(msg, "hub is draining"),
        other => panic!("unexpected negotiate result: {other:?}"),
    }
}

#[tokio::test]
async fn session_handshakes_and_yields_batched_invocations() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

        let handshake = ws.next().await.unwrap().unwrap();
        let text = handshake.into_text().unwrap();
        let request: Value =
            serde_json::from_str(text.as_str().trim_end_matches(protocol::RECORD_SEPARATOR))
                .unwrap();
        assert_eq!(request["protocol"], "json");

        let batch = concat!(
            "{}\u{1e}",
            r#"{"type":1,"target":"ReceiveOne","arguments":["alice","hi"]}"#,
            "\u{1e}"
        );
        ws.send(WsMessage::Text(batch.into())).await.unwrap();
        ws.send(WsMessage::Text(
            concat!(r#"{"type":6}"#, "\u{1e}", r#"{"type":7}"#, "\u{1e}").into(),
        ))
        .await
        .unwrap();
        ws.close(None).await.ok();
    });

    let connector =
        HubConnector::new(reqwest::Client::new(), &config_for(format!("http://{addr}/chatsocket"), true));
    let mut session = connector.connect().await.unwrap();

    assert_eq!(
        session.next_message().await,
        Some(HubMessage::Invocation {
            target: "ReceiveOne".into(),
            arguments: vec![json!("alice"), json!("hi")],
        })
    );
    assert_eq!(session.next_message().await, Some(HubMessage::Ping));
    assert_eq!(
        session.next_message().await,
        Some(HubMessage::Close {
            error: None,
            allow_reconnect: false,
        })
    );
    assert_eq!(session.next_message().await, None);
}

#[tokio::test]
async fn handshake_error_fails_the_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        let _ = ws.next().await;
        ws.send(WsMessage::Text(
            concat!(r#"{"error":"unsupported protocol"}"#, "\u{1e}").into(),
        ))
        .await
        .unwrap();
    });

    let connector =
        HubConnector::new(reqwest::Client::new(), &config_for(format!("http://{addr}/chatsocket"), true));
    assert!(matches!(
        connector.connect().await,
        Err(HubError::Protocol(protocol::ProtocolError::HandshakeRejected(_)))
    ));
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector =
        HubConnector::new(reqwest::Client::new(), &config_for(format!("http://{addr}/chatsocket"), true));
    assert!(matches!(connector.connect().await, Err(HubError::WebSocket(_))));
}

#[tokio::test]
async fn negotiate_follows_redirect_with_access_token() {
    let seen_auth = Arc::new(Mutex::new(None::<String>));
    let store = Arc::clone(&seen_auth);
    let target = Router::new().route(
        "/second/negotiate",
        post(move |headers: HeaderMap| {
            let store = Arc::clone(&store);
            async move {
                let auth = headers
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                *store.lock().expect("auth mutex should lock") = auth;
                axum::Json(json!({
                    "connectionId": "cid",
                    "connectionToken": "ct",
                    "availableTransports": [{ "transport": "WebSockets", "transferFormats": ["Text"] }]
                }))
            }
        }),
    );
    let target_url = format!("{}/second", serve(target).await);

    let redirect_to = target_url.clone();
    let origin = Router::new().route(
        "/chatsocket/negotiate",
        post(move || {
            let redirect_to = redirect_to.clone();
            async move { axum::Json(json!({ "url": redirect_to, "accessToken": "tok" })) }
        }),
    );
    let origin_url = format!("{}/chatsocket", serve(origin).await);

    let connector = HubConnector::new(reqwest::Client::new(), &config_for(origin_url, false));
    let endpoint = connector.negotiate().await.unwrap();

    assert_eq!(
        endpoint,
        Endpoint {
            url: target_url,
            connection_token: Some("ct".into()),
            access_token: Some("tok".into()),
        }
    );
    assert_eq!(seen_auth.lock().unwrap().as_deref(), Some("Bearer tok"));
}

#[tokio::test]
async fn negotiate_gives_up_on_redirect_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hub_url = format!("http://{}/chatsocket", listener.local_addr().unwrap());

    let redirect_to = hub_url.clone();
    let router = Router::new().route(
        "/chatsocket/negotiate",
        post(move || {
            let redirect_to = redirect_to.clone();
            async move { axum::Json(json!({ "url": redirect_to })) }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let connector = HubConnector::new(reqwest::Client::new(), &config_for(hub_url, false));
    assert!(matches!(
        connector.negotiate().await,
        Err(HubError::TooManyRedirects(100))
    ));
}

#[tokio::test]
async fn silent_hub_gets_pinged_then_dropped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (records_tx, mut records_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        let _handshake = ws.next().await;
        ws.send(WsMessage::Text("{}\u{1e}".into())).await.unwrap();

        // Say nothing more; just record what the client sends.
        while let Some(Ok(frame)) = ws.next().await {
            if let WsMessage::Text(text) = frame {
                for record in protocol::split_records(text.as_str()) {
                    let _ = records_tx.send(record.to_string());
                }
            }
        }
    });

    let config = AppConfig {
        keep_alive_secs: 1,
        server_timeout_secs: 2,
        ..config_for(format!("http://{addr}/chatsocket"), true)
    };
    let connector = HubConnector::new(reqwest::Client::new(), &config);
    let mut session = connector.connect().await.unwrap();

    let started = std::time::Instant::now();
    let next = tokio::time::timeout(Duration::from_secs(5), session.next_message())
        .await
        .expect("session should end on its own");
    let elapsed = started.elapsed();

    assert_eq!(next, None);
    assert!(elapsed >= Duration::from_millis(1900), "ended after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "ended after {elapsed:?}");

    let ping = tokio::time::timeout(Duration::from_secs(1), records_rx.recv())
        .await
        .expect("keep-alive ping should reach the hub")
        .expect("hub task ended early");
    let ping: Value = serde_json::from_str(&ping).unwrap();
    assert_eq!(ping, json!({ "type": 6 }));
}
