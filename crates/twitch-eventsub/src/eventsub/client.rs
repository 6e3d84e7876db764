use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::api::{EVENTSUB_API_URL, HelixSubscriptionApi, Transport};
use super::reconcile::Reconciler;
use super::subscription::{SubscriptionKind, SubscriptionRequest};
use super::types::{
    ChatMessageEvent, EventSubMessage, NotificationPayload, RevocationPayload,
    RewardRedemptionEvent, Session, SessionPayload,
};
use crate::auth::TokenManager;
use crate::types::{TwitchEvent, TwitchRole, TwitchUser};

const EVENTSUB_WS_URL: &str = "wss://eventsub.wss.twitch.tv/ws";
const CHANNEL_BUFFER_SIZE: usize = 100;
const RECONNECT_DELAY_SECS: u64 = 5;
const KEEPALIVE_TIMEOUT_BUFFER_SECS: u64 = 5;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// EventSub WebSocket session that reconciles the desired subscriptions on
/// every new session and forwards notifications as [`TwitchEvent`]s.
#[non_exhaustive]
pub struct EventSubClient {
    token_manager: Arc<TokenManager>,
    client: Client,
    broadcaster_id: String,
    client_id: String,
    subscriptions: Vec<SubscriptionRequest>,
    ws_url: String,
    api_url: String,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Clone)]
struct EventSubLifecycleParams {
    event_tx: mpsc::Sender<TwitchEvent>,
    token_manager: Arc<TokenManager>,
    client: Client,
    broadcaster_id: String,
    client_id: String,
    subscriptions: Arc<[SubscriptionRequest]>,
    ws_url: String,
    api_url: String,
    cancel_token: CancellationToken,
}

impl Drop for EventSubClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl EventSubClient {
    #[must_use]
    pub fn new(
        token_manager: Arc<TokenManager>,
        client_id: String,
        broadcaster_id: String,
    ) -> Self {
        Self {
            token_manager,
            client: Client::new(),
            broadcaster_id,
            client_id,
            subscriptions: Vec::new(),
            ws_url: EVENTSUB_WS_URL.to_string(),
            api_url: EVENTSUB_API_URL.to_string(),
            cancel_token: CancellationToken::new(),
            handle: None,
        }
    }

    /// Subscriptions kept in place for every session.
    #[must_use]
    pub fn with_subscriptions(mut self, subscriptions: Vec<SubscriptionRequest>) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Set a custom WebSocket URL (for testing with mock servers)
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn connect(&mut self) -> Result<mpsc::Receiver<TwitchEvent>> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        let params = EventSubLifecycleParams {
            event_tx: tx,
            token_manager: self.token_manager.clone(),
            client: self.client.clone(),
            broadcaster_id: self.broadcaster_id.clone(),
            client_id: self.client_id.clone(),
            subscriptions: self.subscriptions.clone().into(),
            ws_url: self.ws_url.clone(),
            api_url: self.api_url.clone(),
            cancel_token: self.cancel_token.clone(),
        };
        let cancel = self.cancel_token.clone();

        self.handle = Some(tokio::spawn(async move {
            info!("starting EventSub client lifecycle...");

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        info!("EventSub client cancelled");
                        break;
                    }

                    result = run_lifecycle(params.clone()) => {
                        if let Err(e) = result {
                            if cancel.is_cancelled() {
                                info!("EventSub shutdown complete");
                                break;
                            }
                            error!("EventSub connection lost: {:?}. reconnecting in {}s...", e, RECONNECT_DELAY_SECS);
                            tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                        }
                    }
                }
            }
        }));

        Ok(rx)
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }

        Ok(())
    }
}

async fn run_lifecycle(params: EventSubLifecycleParams) -> Result<()> {
    let EventSubLifecycleParams {
        event_tx,
        token_manager,
        client,
        broadcaster_id,
        client_id,
        subscriptions,
        ws_url,
        api_url,
        cancel_token,
    } = params;

    let url = Url::parse(&ws_url)?;
    info!("connecting to EventSub: {}", url);
    let (mut ws_stream, _) = connect_async(url.to_string())
        .await
        .context("EventSub WebSocket connection failed")?;

    let session = receive_welcome(&mut ws_stream).await?;
    info!("EventSub session established: {}", session.id);

    if !subscriptions.is_empty() {
        let token = token_manager.get_token().await?;
        let transport = Transport::websocket(session.id.clone());
        let api = HelixSubscriptionApi::new(client, client_id, token, transport.clone())
            .with_url(api_url);

        let report = Reconciler::new(&api)
            .with_transport(&transport)
            .reconcile(&broadcaster_id, &subscriptions)
            .await;
        report.log(&broadcaster_id);
    }

    let keepalive_timeout =
        Duration::from_secs(session.keepalive_timeout_seconds + KEEPALIVE_TIMEOUT_BUFFER_SECS);

    run_eventsub_loop(ws_stream, event_tx, cancel_token, keepalive_timeout).await
}

async fn receive_welcome(ws: &mut WsStream) -> Result<Session> {
    loop {
        let msg = ws
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("WebSocket closed before welcome"))?
            .context("WebSocket error")?;

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => {
                return Err(anyhow::anyhow!("WebSocket closed during welcome"));
            }
            other => {
                debug!("skipping non-text frame during welcome: {:?}", other);
                continue;
            }
        };

        let parsed: EventSubMessage = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse message during welcome: {} - {}", e, text);
                continue;
            }
        };

        if parsed.metadata.message_type == "session_welcome" {
            let session_payload: SessionPayload = serde_json::from_value(parsed.payload)
                .context("Failed to parse session payload")?;
            return Ok(session_payload.session);
        }

        debug!(
            "skipping non-welcome message: {}",
            parsed.metadata.message_type
        );
    }
}

async fn run_eventsub_loop(
    mut ws: WsStream,
    event_tx: mpsc::Sender<TwitchEvent>,
    cancel_token: CancellationToken,
    keepalive_timeout: Duration,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                info!("EventSub loop cancelled");
                let _ = ws.close(None).await;
                return Ok(());
            }

            result = tokio::time::timeout(keepalive_timeout, ws.next()) => {
                match result {
                    Ok(Some(Ok(msg))) => {
                        handle_eventsub_message(msg, &event_tx).await?;
                    }
                    Ok(Some(Err(e))) => {
                        return Err(anyhow::anyhow!("WebSocket error: {}", e));
                    }
                    Ok(None) => {
                        return Err(anyhow::anyhow!("EventSub WebSocket closed"));
                    }
                    Err(_) => {
                        warn!("EventSub keepalive timeout, reconnecting...");
                        return Err(anyhow::anyhow!("keepalive timeout"));
                    }
                }
            }
        }
    }
}

async fn handle_eventsub_message(msg: Message, event_tx: &mpsc::Sender<TwitchEvent>) -> Result<()> {
    let text = match msg {
        Message::Text(t) => t,
        Message::Close(_) => {
            info!("EventSub sent close frame");
            return Err(anyhow::anyhow!("connection closed"));
        }
        Message::Ping(_) => {
            debug!("EventSub PING received");
            return Ok(());
        }
        _ => return Ok(()),
    };

    trace!("EventSub << {}", text);
    let parsed: EventSubMessage =
        serde_json::from_str(&text).context("Failed to parse EventSub message")?;

    match parsed.metadata.message_type.as_str() {
        "session_keepalive" => {
            debug!("EventSub keepalive");
        }
        "notification" => match parse_notification(parsed) {
            Ok(event) => {
                if event_tx.send(event).await.is_err() {
                    return Err(anyhow::anyhow!("event receiver dropped"));
                }
            }
            Err(e) => warn!("dropping malformed EventSub notification: {:#}", e),
        },
        "session_reconnect" => {
            warn!("EventSub requested reconnect");
            return Err(anyhow::anyhow!("reconnect requested"));
        }
        "revocation" => match serde_json::from_value::<RevocationPayload>(parsed.payload) {
            Ok(revoked) => warn!(
                "EventSub subscription {} ({}) revoked: {}",
                revoked.subscription.id, revoked.subscription.sub_type, revoked.subscription.status
            ),
            Err(_) => warn!("EventSub subscription revoked"),
        },
        other => {
            debug!("Unknown EventSub message type: {}", other);
        }
    }

    Ok(())
}

/// Maps a notification onto the closed set of [`TwitchEvent`] variants.
fn parse_notification(msg: EventSubMessage) -> Result<TwitchEvent> {
    let sub_type = msg.metadata.subscription_type.unwrap_or_default();

    let event = match SubscriptionKind::from(sub_type.as_str()) {
        SubscriptionKind::ChannelPointsRedeem => {
            let payload: NotificationPayload = serde_json::from_value(msg.payload)?;
            let redemption: RewardRedemptionEvent = serde_json::from_value(payload.event)?;

            TwitchEvent::RewardRedemption {
                user: TwitchUser {
                    id: redemption.user_id,
                    display_name: redemption.user_name,
                    role: TwitchRole::empty(),
                },
                reward_id: redemption.reward.id,
                reward_title: redemption.reward.title,
                cost: redemption.reward.cost,
                user_input: redemption.user_input,
            }
        }
        SubscriptionKind::ChatMessage => {
            let payload: NotificationPayload = serde_json::from_value(msg.payload)?;
            let chat_msg: ChatMessageEvent = serde_json::from_value(payload.event)?;

            let role = TwitchRole::from_badges(chat_msg.badges.iter().map(|b| b.set_id.as_str()));

            TwitchEvent::ChatMessage {
                user: TwitchUser {
                    id: chat_msg.chatter_user_id,
                    display_name: chat_msg.chatter_user_name,
                    role,
                },
                channel: Some(chat_msg.broadcaster_user_login),
                text: chat_msg.message.text,
            }
        }
        _ => TwitchEvent::Other {
            subscription_type: sub_type,
            payload: msg.payload,
        },
    };

    Ok(event)
}
