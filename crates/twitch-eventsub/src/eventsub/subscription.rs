use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// EventSub subscription type. Types this crate does not model are kept
/// verbatim in [`SubscriptionKind::Other`] so listings round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionKind {
    ChatMessage,
    ChannelPointsRedeem,
    StreamOnline,
    StreamOffline,
    Other(String),
}

impl SubscriptionKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ChatMessage => "channel.chat.message",
            Self::ChannelPointsRedeem => "channel.channel_points_custom_reward_redemption.add",
            Self::StreamOnline => "stream.online",
            Self::StreamOffline => "stream.offline",
            Self::Other(name) => name,
        }
    }

    #[must_use]
    pub fn version(&self) -> &'static str {
        "1"
    }
}

impl From<String> for SubscriptionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "channel.chat.message" => Self::ChatMessage,
            "channel.channel_points_custom_reward_redemption.add" => Self::ChannelPointsRedeem,
            "stream.online" => Self::StreamOnline,
            "stream.offline" => Self::StreamOffline,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for SubscriptionKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<SubscriptionKind> for String {
    fn from(kind: SubscriptionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Enabled,
    /// Webhook callback verification still outstanding.
    Pending,
    /// Revoked by the platform; carries the status string that says why.
    Revoked(String),
    Other(String),
}

impl SubscriptionStatus {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Enabled => "enabled",
            Self::Pending => "webhook_callback_verification_pending",
            Self::Revoked(reason) | Self::Other(reason) => reason,
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "enabled" => Self::Enabled,
            "webhook_callback_verification_pending" => Self::Pending,
            "authorization_revoked"
            | "moderator_removed"
            | "user_removed"
            | "version_removed"
            | "beta_maintenance"
            | "notification_failures_exceeded" => Self::Revoked(value),
            _ => Self::Other(value),
        }
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification stream the bot wants active.
///
/// Two requests are equal when they share `kind` and `broadcaster_id`; the
/// requester only shapes the condition sent to the API.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub kind: SubscriptionKind,
    pub broadcaster_id: String,
    pub requester_id: String,
}

impl SubscriptionRequest {
    pub fn new(
        kind: SubscriptionKind,
        broadcaster_id: impl Into<String>,
        requester_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            broadcaster_id: broadcaster_id.into(),
            requester_id: requester_id.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> SubscriptionKey<'_> {
        SubscriptionKey {
            kind: &self.kind,
            broadcaster_id: &self.broadcaster_id,
        }
    }

    /// Condition object sent with the create call.
    #[must_use]
    pub fn condition(&self) -> serde_json::Value {
        match self.kind {
            SubscriptionKind::ChatMessage => serde_json::json!({
                "broadcaster_user_id": self.broadcaster_id,
                "user_id": self.requester_id,
            }),
            _ => serde_json::json!({
                "broadcaster_user_id": self.broadcaster_id,
            }),
        }
    }
}

impl PartialEq for SubscriptionRequest {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SubscriptionRequest {}

impl Hash for SubscriptionRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (broadcaster {})", self.kind, self.broadcaster_id)
    }
}

/// Identity of a subscription: at most one enabled record per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey<'a> {
    pub kind: &'a SubscriptionKind,
    pub broadcaster_id: &'a str,
}

/// Server-side subscription as returned by the listing and create calls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub condition: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub transport: Option<RecordTransport>,
}

/// Transport a record was created on. Kept loose so webhook and conduit
/// records in a listing still decode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordTransport {
    pub method: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SubscriptionRecord {
    /// WebSocket session the record delivers to, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.transport.as_ref()?.session_id.as_deref()
    }

    #[must_use]
    pub fn broadcaster_id(&self) -> Option<&str> {
        ["broadcaster_user_id", "to_broadcaster_user_id"]
            .iter()
            .find_map(|field| self.condition.get(*field))
            .and_then(|v| v.as_str())
    }

    #[must_use]
    pub fn key(&self) -> Option<SubscriptionKey<'_>> {
        self.broadcaster_id().map(|broadcaster_id| SubscriptionKey {
            kind: &self.kind,
            broadcaster_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_known_and_unknown_types() {
        assert_eq!(
            SubscriptionKind::from("channel.chat.message"),
            SubscriptionKind::ChatMessage
        );
        assert_eq!(
            SubscriptionKind::from("channel.channel_points_custom_reward_redemption.add"),
            SubscriptionKind::ChannelPointsRedeem
        );
        assert_eq!(
            SubscriptionKind::from("channel.raid"),
            SubscriptionKind::Other("channel.raid".to_string())
        );
        assert_eq!(SubscriptionKind::from("channel.raid").as_str(), "channel.raid");
    }

    #[test]
    fn test_request_equality_ignores_requester() {
        let a = SubscriptionRequest::new(SubscriptionKind::ChatMessage, "42", "bot");
        let b = SubscriptionRequest::new(SubscriptionKind::ChatMessage, "42", "owner");
        let c = SubscriptionRequest::new(SubscriptionKind::ChatMessage, "43", "bot");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_chat_condition_includes_requester() {
        let chat = SubscriptionRequest::new(SubscriptionKind::ChatMessage, "42", "7");
        assert_eq!(chat.condition()["broadcaster_user_id"], "42");
        assert_eq!(chat.condition()["user_id"], "7");

        let redeem = SubscriptionRequest::new(SubscriptionKind::ChannelPointsRedeem, "42", "7");
        assert!(redeem.condition().get("user_id").is_none());
    }

    #[test]
    fn test_parse_record() {
        let json = r#"{
            "id": "26b1c993-bfcf-44d9-b876-379dacafe75a",
            "status": "authorization_revoked",
            "type": "channel.chat.message",
            "version": "1",
            "condition": {
                "broadcaster_user_id": "1234",
                "user_id": "9001"
            },
            "created_at": "2020-11-10T20:08:33.12345678Z",
            "transport": {
                "method": "websocket",
                "session_id": "AQoQexAWVYKSTIu4ec_2VAxyuhAB"
            },
            "cost": 0
        }"#;

        let record: SubscriptionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, SubscriptionKind::ChatMessage);
        assert_eq!(
            record.status,
            SubscriptionStatus::Revoked("authorization_revoked".to_string())
        );
        assert_eq!(record.broadcaster_id(), Some("1234"));
        assert_eq!(record.session_id(), Some("AQoQexAWVYKSTIu4ec_2VAxyuhAB"));
        assert!(!record.status.is_enabled());
    }

    #[test]
    fn test_parse_webhook_record() {
        let json = r#"{
            "id": "w",
            "status": "enabled",
            "type": "stream.online",
            "condition": { "broadcaster_user_id": "1234" },
            "transport": { "method": "webhook", "callback": "https://example.com/hook" }
        }"#;

        let record: SubscriptionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.transport.as_ref().map(|t| t.method.as_str()), Some("webhook"));
        assert!(record.session_id().is_none());
    }

    #[test]
    fn test_record_without_broadcaster_has_no_key() {
        let record = SubscriptionRecord {
            id: "1".to_string(),
            kind: SubscriptionKind::Other("user.update".to_string()),
            status: SubscriptionStatus::Enabled,
            condition: serde_json::Map::new(),
            transport: None,
        };
        assert!(record.key().is_none());
        assert!(record.session_id().is_none());
    }
}
