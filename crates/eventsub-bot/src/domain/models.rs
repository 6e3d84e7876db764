use twitch_eventsub::TwitchRole;

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub role: TwitchRole,
}

impl User {
    /// Placeholder author for events that do not come from a chatter.
    pub fn system() -> Self {
        Self {
            id: "0".into(),
            display_name: "System".into(),
            role: TwitchRole::empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventContext {
    pub user: User,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    ChatMessage {
        text: String,
    },

    RewardRedemption {
        reward_id: String,
        reward_title: String,
        cost: u32,
        user_input: Option<String>,
    },

    Other {
        subscription_type: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub ctx: EventContext,
    pub kind: EventKind,
}

impl Event {
    pub fn user(&self) -> &User {
        &self.ctx.user
    }
}
