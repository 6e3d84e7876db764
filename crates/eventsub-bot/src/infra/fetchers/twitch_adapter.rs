use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use twitch_eventsub::{EventSubClient, SubscriptionRequest, TokenManager, TwitchEvent, TwitchUser};

use crate::core::Shutdowner;
use crate::domain::{
    fetcher::EventFetcher,
    models::{Event, EventContext, EventKind, User},
};

const CHANNEL_BUFFER_SIZE: usize = 100;

/// EventSub session for one broadcaster, bridged into domain events.
#[non_exhaustive]
pub struct TwitchFetcher {
    client: Mutex<EventSubClient>,
    refresh_handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl TwitchFetcher {
    pub fn new(
        token_manager: Arc<TokenManager>,
        client_id: String,
        broadcaster_id: String,
        subscriptions: Vec<SubscriptionRequest>,
    ) -> Self {
        Self::with_cancel_token(
            token_manager,
            client_id,
            broadcaster_id,
            subscriptions,
            CancellationToken::new(),
        )
    }

    pub fn with_cancel_token(
        token_manager: Arc<TokenManager>,
        client_id: String,
        broadcaster_id: String,
        subscriptions: Vec<SubscriptionRequest>,
        cancel_token: CancellationToken,
    ) -> Self {
        let refresh_handle = token_manager.clone().start_background_loop();

        let client = Mutex::new(
            EventSubClient::new(token_manager, client_id, broadcaster_id)
                .with_subscriptions(subscriptions)
                .with_cancel_token(cancel_token.clone()),
        );

        Self {
            client,
            refresh_handle,
            cancel_token,
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

#[async_trait]
impl Shutdowner for TwitchFetcher {
    async fn shutdown(&self) -> anyhow::Result<()> {
        self.cancel_token.cancel();
        self.refresh_handle.abort();
        self.client.lock().await.shutdown().await?;
        Ok(())
    }
}

impl Drop for TwitchFetcher {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.refresh_handle.abort();
    }
}

#[async_trait]
impl EventFetcher for TwitchFetcher {
    async fn fetch(&self) -> Result<mpsc::Receiver<Event>> {
        let mut sdk_rx = self.client.lock().await.connect().await?;
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        let cancellation_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancellation_token.cancelled() => {
                        info!("fetcher cancelled, stopping...");
                        break
                    }

                    maybe_event = sdk_rx.recv() => {
                        match maybe_event {
                            Some(tw) => {
                                if tx.send(tw.into()).await.is_err() {
                                    info!("receiver dropped");
                                    break;
                                }
                            }
                            None => {
                                info!("sdk channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

impl From<TwitchEvent> for Event {
    fn from(event: TwitchEvent) -> Self {
        match event {
            TwitchEvent::ChatMessage {
                user,
                channel,
                text,
            } => Event {
                ctx: EventContext {
                    user: user.into(),
                    channel,
                },
                kind: EventKind::ChatMessage { text },
            },
            TwitchEvent::RewardRedemption {
                user,
                reward_id,
                reward_title,
                cost,
                user_input,
            } => Event {
                ctx: EventContext {
                    user: user.into(),
                    channel: None,
                },
                kind: EventKind::RewardRedemption {
                    reward_id,
                    reward_title,
                    cost,
                    user_input,
                },
            },
            TwitchEvent::Other {
                subscription_type,
                payload,
            } => Event {
                ctx: EventContext {
                    user: User::system(),
                    channel: None,
                },
                kind: EventKind::Other {
                    subscription_type,
                    payload,
                },
            },
        }
    }
}

impl From<TwitchUser> for User {
    fn from(u: TwitchUser) -> Self {
        User {
            id: u.id,
            display_name: u.display_name,
            role: u.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use twitch_eventsub::TwitchRole;

    use super::*;

    fn viewer() -> TwitchUser {
        TwitchUser {
            id: "9001".to_string(),
            display_name: "Viewer".to_string(),
            role: TwitchRole::VIP,
        }
    }

    #[test]
    fn test_chat_message_keeps_author_and_channel() {
        let event: Event = TwitchEvent::ChatMessage {
            user: viewer(),
            channel: Some("streamer".to_string()),
            text: "!not a command".to_string(),
        }
        .into();

        assert_eq!(event.user().id, "9001");
        assert_eq!(event.user().role, TwitchRole::VIP);
        assert_eq!(event.ctx.channel.as_deref(), Some("streamer"));
        assert!(matches!(event.kind, EventKind::ChatMessage { ref text } if text == "!not a command"));
    }

    #[test]
    fn test_redemption_maps_reward_fields() {
        let event: Event = TwitchEvent::RewardRedemption {
            user: viewer(),
            reward_id: "r1".to_string(),
            reward_title: "Hydrate".to_string(),
            cost: 500,
            user_input: Some("now".to_string()),
        }
        .into();

        match event.kind {
            EventKind::RewardRedemption {
                reward_title,
                cost,
                user_input,
                ..
            } => {
                assert_eq!(reward_title, "Hydrate");
                assert_eq!(cost, 500);
                assert_eq!(user_input.as_deref(), Some("now"));
            }
            other => panic!("expected RewardRedemption, got {:?}", other),
        }
    }

    #[test]
    fn test_other_is_attributed_to_system() {
        let event: Event = TwitchEvent::Other {
            subscription_type: "stream.online".to_string(),
            payload: serde_json::json!({ "event": { "type": "live" } }),
        }
        .into();

        assert_eq!(event.user().id, User::system().id);
        assert!(matches!(
            event.kind,
            EventKind::Other { ref subscription_type, .. } if subscription_type == "stream.online"
        ));
    }
}
