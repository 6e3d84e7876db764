pub mod bootstrap;
pub mod config;
pub mod consumer;
pub mod fetchers;
pub mod logging;
pub mod profile;
pub mod signal;

pub use bootstrap::OAuthBootstrap;
pub use config::{BotConfig, Config};
pub use fetchers::TwitchFetcher;
pub use logging::LogGuard;
pub use profile::Profile;
pub use signal::UnixSignalHandler;
