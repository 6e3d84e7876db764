use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::info;
use twitch_eventsub::{SubscriptionKind, SubscriptionRequest};

const DEFAULT_SCOPES: [&str; 5] = [
    "user:read:chat",
    "user:write:chat",
    "user:bot",
    "moderator:read:chat_messages",
    "channel:read:redemptions",
];

/// How much of a notification payload the handlers log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Summary,
    Full,
}

/// Scopes to request, events to subscribe to and how loudly to log them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub scopes: Vec<String>,
    pub subscriptions: Vec<SubscriptionKind>,
    pub verbosity: Verbosity,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            subscriptions: vec![
                SubscriptionKind::ChatMessage,
                SubscriptionKind::ChannelPointsRedeem,
            ],
            verbosity: Verbosity::default(),
        }
    }
}

impl Profile {
    /// Reads the YAML profile at `path`, or the built-in one when no path is
    /// configured. Fields left out of the file keep their defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        let profile = Self::parse(&text)
            .with_context(|| format!("invalid profile {}", path.display()))?;

        info!(
            "loaded profile {} ({} scopes, {} subscriptions)",
            path.display(),
            profile.scopes.len(),
            profile.subscriptions.len()
        );
        Ok(profile)
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Subscriptions wanted on `broadcaster_id`, created on behalf of
    /// `requester_id`.
    pub fn desired(&self, broadcaster_id: &str, requester_id: &str) -> Vec<SubscriptionRequest> {
        let mut desired: Vec<SubscriptionRequest> = Vec::with_capacity(self.subscriptions.len());

        for kind in &self.subscriptions {
            let request = SubscriptionRequest::new(kind.clone(), broadcaster_id, requester_id);
            if !desired.contains(&request) {
                desired.push(request);
            }
        }

        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = Profile::default();

        assert!(profile.scopes.contains(&"user:bot".to_string()));
        assert!(profile.scopes.contains(&"channel:read:redemptions".to_string()));
        assert_eq!(
            profile.subscriptions,
            [SubscriptionKind::ChatMessage, SubscriptionKind::ChannelPointsRedeem]
        );
        assert_eq!(profile.verbosity, Verbosity::Summary);
    }

    #[test]
    fn test_parse_full_profile() {
        let yaml = r#"
scopes:
  - user:read:chat
  - user:bot
subscriptions:
  - channel.chat.message
  - stream.online
verbosity: full
"#;
        let profile = Profile::parse(yaml).unwrap();

        assert_eq!(profile.scopes, ["user:read:chat", "user:bot"]);
        assert_eq!(
            profile.subscriptions,
            [SubscriptionKind::ChatMessage, SubscriptionKind::StreamOnline]
        );
        assert_eq!(profile.verbosity, Verbosity::Full);
    }

    #[test]
    fn test_parse_partial_profile_keeps_defaults() {
        let profile = Profile::parse("verbosity: quiet\n").unwrap();

        assert_eq!(profile.verbosity, Verbosity::Quiet);
        assert_eq!(profile.scopes, Profile::default().scopes);
        assert_eq!(profile.subscriptions, Profile::default().subscriptions);
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        assert!(Profile::parse("scope: [user:bot]\n").is_err());
    }

    #[test]
    fn test_desired_dedups_by_key() {
        let profile = Profile {
            subscriptions: vec![
                SubscriptionKind::ChatMessage,
                SubscriptionKind::ChannelPointsRedeem,
                SubscriptionKind::ChatMessage,
            ],
            ..Profile::default()
        };

        let desired = profile.desired("42", "7");
        assert_eq!(desired.len(), 2);
        assert_eq!(desired[0].kind, SubscriptionKind::ChatMessage);
        assert_eq!(desired[0].broadcaster_id, "42");
        assert_eq!(desired[0].requester_id, "7");
        assert_eq!(desired[1].kind, SubscriptionKind::ChannelPointsRedeem);
    }

    #[tokio::test]
    async fn test_load_without_path_is_default() {
        assert_eq!(Profile::load(None).await.unwrap(), Profile::default());
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.yaml");
        tokio::fs::write(&path, "subscriptions: [stream.offline]\n")
            .await
            .unwrap();

        let profile = Profile::load(Some(&path)).await.unwrap();
        assert_eq!(profile.subscriptions, [SubscriptionKind::StreamOffline]);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        let err = Profile::load(Some(&path)).await.unwrap_err();
        assert!(format!("{err:#}").contains("absent.yaml"));
    }
}
