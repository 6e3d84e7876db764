use std::collections::HashMap;
use std::path::PathBuf;

const PREFIX: &str = "TWITCH_";

const DEFAULT_REDIRECT_URI: &str = "http://localhost:4343/oauth";
const DEFAULT_TOKEN_STORE: &str = ".tokens.json";

/// Raw `TWITCH_*` environment values.
#[non_exhaustive]
pub struct Config {
    kv: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let kv = std::env::vars()
            .filter(|(k, _)| k.starts_with(PREFIX))
            .collect();

        Self { kv }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn from_map(kv: HashMap<String, String>) -> Self {
        Self { kv }
    }

    /// Value of `key`, with empty values treated as unset.
    pub fn optional(&self, key: &str) -> Option<&str> {
        self.kv
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> anyhow::Result<&str> {
        self.optional(key)
            .ok_or_else(|| anyhow::anyhow!("required config key '{key}'"))
    }
}

/// Channel the bot subscribes to, before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    BroadcasterId(String),
    Login(String),
}

/// Settings resolved once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BotConfig {
    pub client_id: String,
    pub client_secret: String,
    pub bot_id: String,
    pub owner_id: String,
    pub channel: Option<String>,
    pub broadcaster_id: Option<String>,
    pub redirect_uri: String,
    pub token_store: PathBuf,
    pub profile: Option<PathBuf>,
}

impl BotConfig {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client_id: config.require("TWITCH_CLIENT_ID")?.to_string(),
            client_secret: config.require("TWITCH_CLIENT_SECRET")?.to_string(),
            bot_id: config.require("TWITCH_BOT_ID")?.to_string(),
            owner_id: config.require("TWITCH_OWNER_ID")?.to_string(),
            channel: config.optional("TWITCH_CHANNEL").map(str::to_string),
            broadcaster_id: config.optional("TWITCH_BROADCASTER_ID").map(str::to_string),
            redirect_uri: config
                .optional("TWITCH_REDIRECT_URI")
                .unwrap_or(DEFAULT_REDIRECT_URI)
                .to_string(),
            token_store: config
                .optional("TWITCH_TOKEN_STORE")
                .unwrap_or(DEFAULT_TOKEN_STORE)
                .into(),
            profile: config.optional("TWITCH_PROFILE").map(PathBuf::from),
        })
    }

    /// An explicit broadcaster id wins over a channel login; with neither the
    /// owner's own channel is used.
    pub fn target(&self) -> Target {
        if let Some(id) = &self.broadcaster_id {
            return Target::BroadcasterId(id.clone());
        }

        match &self.channel {
            Some(login) => Target::Login(login.trim_start_matches('#').to_lowercase()),
            None => Target::BroadcasterId(self.owner_id.clone()),
        }
    }
}
