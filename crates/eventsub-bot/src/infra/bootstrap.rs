//! First-run authorization and the credential plumbing around it.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use twitch_eventsub::{
    CallbackServer, Credential, OAuthClient, TokenManager, TokenStore, UsersClient,
};
use uuid::Uuid;

use crate::infra::config::{BotConfig, Target};

#[non_exhaustive]
pub struct OAuthBootstrap {
    oauth: OAuthClient,
    store: Arc<TokenStore>,
    preferred: Vec<String>,
    open_browser: bool,
}

impl OAuthBootstrap {
    pub fn new(config: &BotConfig, store: Arc<TokenStore>) -> Self {
        Self {
            oauth: OAuthClient::new(
                config.client_id.clone(),
                config.client_secret.clone(),
                config.redirect_uri.clone(),
            ),
            store,
            preferred: vec![config.bot_id.clone(), config.owner_id.clone()],
            open_browser: true,
        }
    }

    #[must_use]
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Returns a stored credential, or runs the authorization code flow for
    /// `scopes` when the store is empty. Stored credentials are not checked.
    pub async fn authorize(&self, scopes: &[String]) -> anyhow::Result<Credential> {
        let preferred: Vec<&str> = self.preferred.iter().map(String::as_str).collect();
        if let Some(credential) = self.store.preferred(&preferred).await {
            info!(
                "using stored credential for user {} ({} in {})",
                credential.user_id,
                self.store.len().await,
                self.store.path().display()
            );
            return Ok(credential);
        }

        info!("token store is empty, starting authorization");

        let state = Uuid::new_v4().to_string();
        let url = self.oauth.authorize_url(scopes, &state)?;

        let server = CallbackServer::bind(self.oauth.redirect_uri())
            .await
            .context("failed to start OAuth callback listener")?;
        let pending = server.spawn(state);

        println!("Open this URL to authorize the bot:\n\n    {url}\n");
        if self.open_browser {
            if let Err(e) = open::that(url.as_str()) {
                warn!("failed to open browser: {}", e);
            }
        }

        let code = pending.wait().await.context("authorization did not complete")?;
        let tokens = self
            .oauth
            .exchange_code(&code)
            .await
            .context("failed to exchange authorization code")?;
        let validated = self
            .oauth
            .validate(&tokens.access_token)
            .await
            .context("failed to validate new access token")?;

        if tokens.refresh_token.is_none() {
            warn!("token response has no refresh token, the credential will expire");
        }

        self.store
            .add(
                &validated.user_id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
            )
            .await?;
        info!("authorized as {} ({})", validated.login, validated.user_id);

        Ok(Credential {
            user_id: validated.user_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }
}

/// Token manager seeded with `credential`. Refreshed tokens are written back
/// to `store`.
pub fn token_manager(
    config: &BotConfig,
    store: Arc<TokenStore>,
    credential: &Credential,
) -> Arc<TokenManager> {
    let user_id = credential.user_id.clone();

    let manager = TokenManager::new(
        config.client_id.clone(),
        config.client_secret.clone(),
        credential.refresh_token.clone().unwrap_or_default(),
    )
    .with_access_token(credential.access_token.clone())
    .with_rotation_callback(Box::new(move |pair| {
        let store = store.clone();
        let user_id = user_id.clone();
        let pair = pair.clone();

        tokio::spawn(async move {
            if let Err(e) = store
                .add(&user_id, &pair.access_token, Some(&pair.refresh_token))
                .await
            {
                error!("failed to persist refreshed token for {}: {}", user_id, e);
            }
        });
    }));

    Arc::new(manager)
}

/// Broadcaster id the bot subscribes on. A channel login is looked up once.
pub async fn resolve_broadcaster(config: &BotConfig, access_token: &str) -> anyhow::Result<String> {
    let login = match config.target() {
        Target::BroadcasterId(id) => return Ok(id),
        Target::Login(login) => login,
    };

    let users = UsersClient::new(
        reqwest::Client::new(),
        config.client_id.clone(),
        access_token.to_string(),
    );
    let user = users
        .by_login(&login)
        .await
        .with_context(|| format!("failed to look up channel '{login}'"))?
        .with_context(|| format!("channel '{login}' does not exist"))?;

    info!("channel {} resolved to broadcaster {}", user.login, user.id);
    Ok(user.id)
}
