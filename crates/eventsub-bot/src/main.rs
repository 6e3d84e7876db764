mod core;
mod domain;
mod infra;

use crate::core::App;
use std::sync::Arc;

use anyhow::Context;
use infra::{BotConfig, Config, LogGuard, OAuthBootstrap, Profile, TwitchFetcher, UnixSignalHandler};
use tracing::info;
use twitch_eventsub::TokenStore;

use crate::infra::bootstrap::{resolve_broadcaster, token_manager};
use crate::infra::consumer::{
    BaseRouter, Consumer, LoggingMiddleware, Route, message_handler::MessageHandler,
    other_handler::OtherHandler, redemption_handler::RedemptionHandler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let log_guard = LogGuard::init()?;

    let config = Arc::new(BotConfig::from_config(&Config::new())?);
    let profile = Profile::load(config.profile.as_deref()).await?;

    let store = Arc::new(
        TokenStore::load(&config.token_store)
            .await
            .context("failed to load token store")?,
    );
    let credential = OAuthBootstrap::new(&config, store.clone())
        .authorize(&profile.scopes)
        .await?;

    let tokens = token_manager(&config, store, &credential);
    let broadcaster_id = resolve_broadcaster(&config, &tokens.get_token().await?).await?;
    let desired = profile.desired(&broadcaster_id, &credential.user_id);
    info!(
        "bot {} watching broadcaster {} with {} subscription(s)",
        credential.user_id,
        broadcaster_id,
        desired.len()
    );

    let verbosity = profile.verbosity;
    let router = BaseRouter::new()
        .route(Route::Message, Arc::new(MessageHandler::new(verbosity)))
        .route(
            Route::ChannelPointRedemption,
            Arc::new(RedemptionHandler::new(verbosity)),
        )
        .route(Route::Other, Arc::new(OtherHandler::new(verbosity)));

    let consumer = Consumer::new(LoggingMiddleware::new(router, verbosity));
    let fetcher = TwitchFetcher::new(tokens, config.client_id.clone(), broadcaster_id, desired);

    App::new(log_guard, UnixSignalHandler::new(), fetcher, consumer)
        .run()
        .await
}
