#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TwitchRole(u8);

impl TwitchRole {
    const BIT_SUBSCRIBER: u8 = 1 << 0;
    const BIT_VIP: u8 = 1 << 1;
    const BIT_MODERATOR: u8 = 1 << 2;
    const BIT_BROADCASTER: u8 = 1 << 3;

    pub const SUBSCRIBER: TwitchRole = TwitchRole(Self::BIT_SUBSCRIBER);
    pub const VIP: TwitchRole = TwitchRole(Self::BIT_VIP);
    pub const MODERATOR: TwitchRole = TwitchRole(Self::BIT_MODERATOR);
    pub const BROADCASTER: TwitchRole = TwitchRole(Self::BIT_BROADCASTER);

    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Builds a role from chat badge set ids. Unknown badges are ignored.
    pub fn from_badges<'a>(set_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut role = Self::empty();
        for set_id in set_ids {
            match set_id {
                "broadcaster" => role.add(Self::BROADCASTER),
                "moderator" => role.add(Self::MODERATOR),
                "vip" => role.add(Self::VIP),
                "subscriber" | "founder" => role.add(Self::SUBSCRIBER),
                _ => {}
            }
        }
        role
    }

    pub fn add(&mut self, other: TwitchRole) {
        self.0 |= other.0;
    }

    /// Returns the highest priority role from the combined roles.
    /// Priority: BROADCASTER > MODERATOR > VIP > SUBSCRIBER > empty
    #[must_use]
    pub fn highest(&self) -> TwitchRole {
        const PRIORITY: [u8; 4] = [
            TwitchRole::BIT_BROADCASTER,
            TwitchRole::BIT_MODERATOR,
            TwitchRole::BIT_VIP,
            TwitchRole::BIT_SUBSCRIBER,
        ];
        for bit in PRIORITY {
            if self.0 & bit != 0 {
                return TwitchRole(bit);
            }
        }
        TwitchRole(0)
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self.highest() {
            Self::BROADCASTER => "broadcaster",
            Self::MODERATOR => "moderator",
            Self::VIP => "vip",
            Self::SUBSCRIBER => "subscriber",
            _ => "viewer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwitchUser {
    pub id: String,
    pub display_name: String,
    pub role: TwitchRole,
}

#[derive(Debug, Clone)]
pub enum TwitchEvent {
    ChatMessage {
        user: TwitchUser,
        channel: Option<String>,
        text: String,
    },
    RewardRedemption {
        user: TwitchUser,
        reward_id: String,
        reward_title: String,
        cost: u32,
        user_input: Option<String>,
    },
    /// A notification whose subscription type has no dedicated variant.
    Other {
        subscription_type: String,
        payload: serde_json::Value,
    },
}
