//! Integration tests for EventSubClient using a mock WebSocket server.
//!
//! Most tests point the subscription API at a closed local port, so
//! reconciliation degrades and logs while the session keeps delivering
//! notifications.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use twitch_eventsub::{
    EventSubClient, SubscriptionKind, SubscriptionRequest, TokenManager, TwitchEvent, TwitchRole,
};

use common::MockHttpServer;

const UNREACHABLE_API: &str = "http://127.0.0.1:1/helix/eventsub/subscriptions";

struct MockEventSubServer {
    addr: SocketAddr,
    outgoing_tx: mpsc::Sender<String>,
}

impl MockEventSubServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(32);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws_stream = accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws_stream.split();

            if write.send(Message::Text(welcome())).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    Some(msg) = outgoing_rx.recv() => {
                        if write.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Close(_))) | None => break,
                            _ => {}
                        }
                    }
                }
            }
        });

        Self { addr, outgoing_tx }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn send(&self, msg: String) {
        self.outgoing_tx.send(msg).await.unwrap();
    }
}

fn welcome() -> String {
    r#"{
        "metadata": {
            "message_id": "96a3f3b5-5dec-4eed-908e-e11ee657416c",
            "message_type": "session_welcome",
            "message_timestamp": "2023-07-19T14:56:51.634234626Z"
        },
        "payload": {
            "session": {
                "id": "AQoQILE98gtqShGmLD7AM6yJThAB",
                "status": "connected",
                "connected_at": "2023-07-19T14:56:51.616329898Z",
                "keepalive_timeout_seconds": 10,
                "reconnect_url": null
            }
        }
    }"#
    .to_string()
}

fn keepalive() -> String {
    r#"{
        "metadata": {
            "message_id": "84c1e79a-2a4b-4c13-ba0b-4312293e9308",
            "message_type": "session_keepalive",
            "message_timestamp": "2023-07-19T10:11:12.634234626Z"
        },
        "payload": {}
    }"#
    .to_string()
}

fn notification(sub_type: &str, event: &str) -> String {
    format!(
        r#"{{
            "metadata": {{
                "message_id": "befa7b53-d79d-478f-86b9-120f112b044e",
                "message_type": "notification",
                "message_timestamp": "2022-11-16T10:11:12.464757833Z",
                "subscription_type": "{sub_type}",
                "subscription_version": "1"
            }},
            "payload": {{ "event": {event} }}
        }}"#
    )
}

fn chat_notification(user: &str, text: &str) -> String {
    notification(
        "channel.chat.message",
        &format!(
            r#"{{
                "broadcaster_user_id": "42",
                "broadcaster_user_login": "streamer",
                "chatter_user_id": "9001",
                "chatter_user_name": "{user}",
                "message": {{ "text": "{text}", "fragments": [] }},
                "badges": [{{ "set_id": "vip", "id": "1", "info": "" }}]
            }}"#
        ),
    )
}

async fn test_token_manager() -> Arc<TokenManager> {
    let tm = Arc::new(TokenManager::new(
        "test_client_id".to_string(),
        "test_secret".to_string(),
        "test_refresh".to_string(),
    ));
    tm.set_token_for_test("test_token_12345".to_string()).await;
    tm
}

fn client(server: &MockEventSubServer, tm: Arc<TokenManager>, cancel: &CancellationToken) -> EventSubClient {
    EventSubClient::new(tm, "test_client_id".to_string(), "42".to_string())
        .with_subscriptions(vec![SubscriptionRequest::new(
            SubscriptionKind::ChatMessage,
            "42",
            "7",
        )])
        .with_url(server.url())
        .with_api_url(UNREACHABLE_API)
        .with_cancel_token(cancel.clone())
}

async fn next_event(rx: &mut mpsc::Receiver<TwitchEvent>) -> TwitchEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed unexpectedly")
}

#[tokio::test]
async fn test_eventsub_client_receives_chat_message() {
    let server = MockEventSubServer::start().await;
    let cancel = CancellationToken::new();
    let mut client = client(&server, test_token_manager().await, &cancel);

    let mut rx = client.connect().await.unwrap();
    server.send(chat_notification("Viewer", "Hello world!")).await;

    match next_event(&mut rx).await {
        TwitchEvent::ChatMessage {
            user,
            channel,
            text,
        } => {
            assert_eq!(user.id, "9001");
            assert_eq!(user.display_name, "Viewer");
            assert_eq!(user.role, TwitchRole::VIP);
            assert_eq!(channel.as_deref(), Some("streamer"));
            assert_eq!(text, "Hello world!");
        }
        other => panic!("Expected ChatMessage, got {:?}", other),
    }

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_eventsub_client_skips_keepalive_and_keeps_order() {
    let server = MockEventSubServer::start().await;
    let cancel = CancellationToken::new();
    let mut client = client(&server, test_token_manager().await, &cancel);

    let mut rx = client.connect().await.unwrap();
    server.send(chat_notification("User1", "First message")).await;
    server.send(keepalive()).await;
    server.send(chat_notification("User2", "Second message")).await;

    let texts: Vec<String> = [next_event(&mut rx).await, next_event(&mut rx).await]
        .into_iter()
        .map(|event| match event {
            TwitchEvent::ChatMessage { text, .. } => text,
            other => panic!("Expected ChatMessage, got {:?}", other),
        })
        .collect();
    assert_eq!(texts, ["First message", "Second message"]);

    cancel.cancel();
}

#[tokio::test]
async fn test_eventsub_client_forwards_unknown_types() {
    let server = MockEventSubServer::start().await;
    let cancel = CancellationToken::new();
    let mut client = client(&server, test_token_manager().await, &cancel);

    let mut rx = client.connect().await.unwrap();
    server
        .send(notification(
            "channel.follow",
            r#"{ "user_name": "Follower", "followed_at": "2023-07-15T18:16:11.17106713Z" }"#,
        ))
        .await;

    match next_event(&mut rx).await {
        TwitchEvent::Other {
            subscription_type,
            payload,
        } => {
            assert_eq!(subscription_type, "channel.follow");
            assert_eq!(payload["event"]["user_name"], "Follower");
        }
        other => panic!("Expected Other, got {:?}", other),
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_eventsub_client_cancellation() {
    let server = MockEventSubServer::start().await;
    let cancel = CancellationToken::new();
    let mut client = client(&server, test_token_manager().await, &cancel);

    let mut rx = client.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    cancel.cancel();
    client.shutdown().await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("receiver should close after shutdown");
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_welcome_reconciles_on_the_new_session() {
    let server = MockEventSubServer::start().await;
    let mut api = MockHttpServer::start(vec![
        (200, r#"{"data":[],"total":0,"pagination":{}}"#),
        (
            202,
            r#"{"data":[{"id":"sub-1","status":"enabled","type":"channel.chat.message","version":"1","condition":{"broadcaster_user_id":"42","user_id":"7"},"transport":{"method":"websocket","session_id":"AQoQILE98gtqShGmLD7AM6yJThAB"}}]}"#,
        ),
    ])
    .await;
    let cancel = CancellationToken::new();
    let mut client = client(&server, test_token_manager().await, &cancel)
        .with_api_url(api.url("/helix/eventsub/subscriptions"));

    let _rx = client.connect().await.unwrap();

    let list = api.next_request().await;
    assert!(list.starts_with("GET /helix/eventsub/subscriptions HTTP/1.1"));

    let create = api.next_request().await;
    assert!(create.starts_with("POST /helix/eventsub/subscriptions HTTP/1.1"));
    assert!(create.contains(r#""session_id":"AQoQILE98gtqShGmLD7AM6yJThAB""#));
    assert!(create.contains(r#""broadcaster_user_id":"42""#));

    cancel.cancel();
    client.shutdown().await.unwrap();
}
