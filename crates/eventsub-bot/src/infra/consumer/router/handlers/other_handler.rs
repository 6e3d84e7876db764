use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    domain::models::{Event, EventKind},
    infra::{consumer::router::traits::Handler, profile::Verbosity},
};

/// Logs notifications that have no dedicated handler.
#[non_exhaustive]
pub struct OtherHandler {
    verbosity: Verbosity,
}

impl OtherHandler {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

#[async_trait]
impl Handler for OtherHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let EventKind::Other {
            subscription_type,
            payload,
        } = &event.kind
        else {
            anyhow::bail!("other handler got {:?}", event.kind);
        };

        let description = describe_other(payload);
        match self.verbosity {
            Verbosity::Quiet => debug!("{}: {}", subscription_type, description),
            Verbosity::Summary => info!("{}: {}", subscription_type, description),
            Verbosity::Full => info!(
                "{}: {}\n{}",
                subscription_type,
                description,
                serde_json::to_string_pretty(payload)?
            ),
        }

        Ok(())
    }
}

/// Pulls author and text out of a chat-shaped `event` object; anything else
/// is described by its field names.
pub fn describe_other(payload: &Value) -> String {
    let event = payload.get("event").and_then(Value::as_object);

    if let Some(event) = event {
        let author = ["chatter_user_name", "user_name", "user_login"]
            .iter()
            .find_map(|key| event.get(*key).and_then(Value::as_str));
        let text = event
            .get("message")
            .and_then(|m| m.get("text").or(Some(m)))
            .and_then(Value::as_str);

        if let (Some(author), Some(text)) = (author, text) {
            return format!("{author}: {text}");
        }
        let fields = shape(&Value::Object(event.clone()));
        return match author {
            Some(author) => format!("from {author} {fields}"),
            None => fields,
        };
    }

    shape(payload)
}

fn shape(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("{{{}}}", keys.join(", "))
        }
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_describe_chat_shaped_event() {
        let payload = json!({
            "subscription": { "type": "channel.chat.notification" },
            "event": {
                "chatter_user_name": "Viewer",
                "message": { "text": "resubbed!", "fragments": [] }
            }
        });

        assert_eq!(describe_other(&payload), "Viewer: resubbed!");
    }

    #[test]
    fn test_describe_plain_message_string() {
        let payload = json!({ "event": { "user_name": "Cheerer", "message": "take my bits" } });
        assert_eq!(describe_other(&payload), "Cheerer: take my bits");
    }

    #[test]
    fn test_describe_event_with_author_only() {
        let payload = json!({ "event": { "user_name": "Follower", "followed_at": "now" } });
        assert_eq!(describe_other(&payload), "from Follower {followed_at, user_name}");
    }

    #[test]
    fn test_describe_falls_back_to_shape() {
        let payload = json!({ "event": { "type": "live", "started_at": "now" } });
        assert_eq!(describe_other(&payload), "{started_at, type}");

        let payload = json!({ "subscription": { "type": "stream.online" }, "event": {} });
        assert_eq!(describe_other(&payload), "{}");

        assert_eq!(describe_other(&json!([1, 2, 3])), "[3 items]");
        assert_eq!(describe_other(&Value::Null), "null");
    }
}
