use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::oauth::TOKEN_URL;

const REFRESH_BUFFER_SECS: u64 = 600;
const RETRY_DELAY_SECS: u64 = 30;
const MIN_SLEEP_SECS: u64 = 60;

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

/// Access and refresh token after a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub type OnTokenRotation = Box<dyn Fn(&TokenPair) + Send + Sync>;

/// Holds the user access token the bot talks to the API with and keeps it
/// fresh with the refresh token.
#[non_exhaustive]
pub struct TokenManager {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    refresh_token: RwLock<String>,
    current_token: ArcSwapOption<String>,
    /// Stored token of unknown age, used only when a refresh is impossible.
    seeded_token: Option<String>,
    /// When the last refresh happened and how long that token lives.
    last_refresh: RwLock<Option<(Instant, u64)>>,
    init_lock: Mutex<()>,
    on_rotation: Option<OnTokenRotation>,
}

impl TokenManager {
    #[must_use]
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            token_url: TOKEN_URL.to_string(),
            refresh_token: RwLock::new(refresh_token),
            current_token: ArcSwapOption::empty(),
            seeded_token: None,
            last_refresh: RwLock::new(None),
            init_lock: Mutex::new(()),
            on_rotation: None,
        }
    }

    /// Stored access token of unknown age. With a refresh token it is
    /// replaced by a fresh one on first use and only served if that refresh
    /// fails; without one it is served as is.
    #[must_use]
    pub fn with_access_token(mut self, access_token: String) -> Self {
        self.seeded_token = Some(access_token);
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    #[must_use]
    pub fn with_rotation_callback(mut self, callback: OnTokenRotation) -> Self {
        self.on_rotation = Some(callback);
        self
    }

    pub async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.current_token.load_full() {
            return Ok(token.as_ref().clone());
        }

        let _guard = self.init_lock.lock().await;

        if let Some(token) = self.current_token.load_full() {
            return Ok(token.as_ref().clone());
        }

        if !self.has_refresh_token().await {
            if let Some(seeded) = &self.seeded_token {
                self.current_token.store(Some(Arc::new(seeded.clone())));
                return Ok(seeded.clone());
            }
        }

        match (self.refresh_now().await, &self.seeded_token) {
            (Ok((token, _)), _) => Ok(token),
            (Err(e), Some(seeded)) => {
                warn!("failed to refresh stored token, using it as is: {:#}", e);
                self.current_token.store(Some(Arc::new(seeded.clone())));
                Ok(seeded.clone())
            }
            (Err(e), None) => Err(e),
        }
    }

    pub async fn has_refresh_token(&self) -> bool {
        !self.refresh_token.read().await.is_empty()
    }

    /// Refreshes ahead of expiry until the task is aborted. Without an
    /// earlier refresh the first one runs right away.
    pub fn start_background_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.has_refresh_token().await {
                warn!("no refresh token available, access token will not be refreshed");
                return;
            }

            info!("starting token refresh background task");

            loop {
                if let Some(wait) = self.time_until_refresh().await {
                    tokio::time::sleep(wait).await;
                }

                let result = {
                    let _guard = self.init_lock.lock().await;
                    self.refresh_now().await
                };

                match result {
                    Ok((_, expires_in)) => {
                        info!(
                            "token refreshed. next refresh in {} seconds",
                            refresh_delay_secs(expires_in)
                        );
                    }
                    Err(e) => {
                        error!(
                            "failed to refresh token: {:?}. retrying in {}s...",
                            e, RETRY_DELAY_SECS
                        );
                        tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
                    }
                }
            }
        })
    }

    async fn time_until_refresh(&self) -> Option<Duration> {
        let (at, expires_in) = (*self.last_refresh.read().await)?;
        let due = at + Duration::from_secs(refresh_delay_secs(expires_in));
        Some(due.saturating_duration_since(Instant::now()))
    }

    async fn refresh_now(&self) -> Result<(String, u64)> {
        let current_refresh = self.refresh_token.read().await.clone();
        if current_refresh.is_empty() {
            anyhow::bail!("no refresh token to refresh with");
        }

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", current_refresh.as_str()),
        ];

        let res = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?
            .error_for_status()
            .context("token refresh request failed")?
            .json::<TokenResponse>()
            .await
            .context("failed to parse token response")?;

        self.current_token
            .store(Some(Arc::new(res.access_token.clone())));
        *self.last_refresh.write().await = Some((Instant::now(), res.expires_in));

        let refresh_token = match res.refresh_token {
            Some(new_rt) if new_rt != current_refresh => {
                warn!("twitch rotated the refresh token");
                *self.refresh_token.write().await = new_rt.clone();
                new_rt
            }
            _ => current_refresh,
        };

        if let Some(ref callback) = self.on_rotation {
            callback(&TokenPair {
                access_token: res.access_token.clone(),
                refresh_token,
            });
        }

        Ok((res.access_token, res.expires_in))
    }

    /// Set a token directly, bypassing OAuth refresh. For testing only.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn set_token_for_test(&self, token: String) {
        self.current_token.store(Some(Arc::new(token)));
    }
}

fn refresh_delay_secs(expires_in: u64) -> u64 {
    expires_in
        .saturating_sub(REFRESH_BUFFER_SECS)
        .max(MIN_SLEEP_SECS)
}
