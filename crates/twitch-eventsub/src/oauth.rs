//! Authorization code grant against the Twitch identity service.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub const AUTHORIZE_URL: &str = "https://id.twitch.tv/oauth2/authorize";
pub const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

#[derive(Debug, Error)]
pub enum AuthExchangeError {
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token exchange rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("token response has no access_token: {body}")]
    MissingAccessToken { body: String },

    #[error("token validation failed ({status}): {body}")]
    Validation { status: u16, body: String },
}

/// Tokens returned for an authorization code.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Vec<String>,
}

/// Identity behind an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatedToken {
    pub user_id: String,
    pub login: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_in: u64,
}

#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Vec<String>,
}

#[non_exhaustive]
pub struct OAuthClient {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    validate_url: String,
}

impl OAuthClient {
    #[must_use]
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            redirect_uri,
            token_url: TOKEN_URL.to_string(),
            validate_url: VALIDATE_URL.to_string(),
        }
    }

    /// Points the token and validate calls at another host (for testing with
    /// mock servers).
    #[must_use]
    pub fn with_endpoints(mut self, token_url: impl Into<String>, validate_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.validate_url = validate_url.into();
        self
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// URL the user opens to grant `scopes`. Scopes are space separated and
    /// percent-encoded.
    pub fn authorize_url(&self, scopes: &[String], state: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("force_verify", "true")
            .append_pair("state", state);
        Ok(url)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<CodeTokens, AuthExchangeError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self.client.post(&self.token_url).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let raw: RawTokenResponse = serde_json::from_str(&body)
            .map_err(|_| AuthExchangeError::MissingAccessToken { body: body.clone() })?;
        let Some(access_token) = raw.access_token else {
            return Err(AuthExchangeError::MissingAccessToken { body });
        };

        info!("authorization code exchanged for tokens");
        Ok(CodeTokens {
            access_token,
            refresh_token: raw.refresh_token,
            expires_in: raw.expires_in,
            scope: raw.scope,
        })
    }

    /// App access token from the client credentials grant. Enough for
    /// public lookups such as users by login.
    pub async fn app_access_token(&self) -> Result<String, AuthExchangeError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self.client.post(&self.token_url).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<RawTokenResponse>(&body)
            .ok()
            .and_then(|raw| raw.access_token)
            .ok_or(AuthExchangeError::MissingAccessToken { body })
    }

    pub async fn validate(&self, access_token: &str) -> Result<ValidatedToken, AuthExchangeError> {
        let response = self
            .client
            .get(&self.validate_url)
            .header("Authorization", format!("OAuth {}", access_token))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthExchangeError::Validation {
                status: status.as_u16(),
                body,
            });
        }

        let validated: ValidatedToken =
            serde_json::from_str(&body).map_err(|_| AuthExchangeError::Validation {
                status: status.as_u16(),
                body: body.clone(),
            })?;
        debug!(
            "token belongs to {} ({}) with scopes {:?}",
            validated.login, validated.user_id, validated.scopes
        );
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient::new(
            "my_client".to_string(),
            "secret".to_string(),
            "http://localhost:4343/oauth".to_string(),
        )
    }

    #[test]
    fn test_authorize_url_encodes_scopes() {
        let scopes = vec!["user:read:chat".to_string(), "user:bot".to_string()];
        let url = client().authorize_url(&scopes, "abc").unwrap();

        assert!(url.as_str().starts_with(AUTHORIZE_URL));
        assert!(url.as_str().contains("scope=user%3Aread%3Achat+user%3Abot"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "my_client".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:4343/oauth".to_string()
        )));
        assert!(pairs.contains(&("scope".to_string(), "user:read:chat user:bot".to_string())));
        assert!(pairs.contains(&("state".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
    }

    #[test]
    fn test_parse_validate_response() {
        let json = r#"{
            "client_id": "wbmytr93xzw8zbg0p1izqyzzc5mbiz",
            "login": "twitchdev",
            "scopes": ["channel:read:subscriptions"],
            "user_id": "141981764",
            "expires_in": 5520838
        }"#;
        let validated: ValidatedToken = serde_json::from_str(json).unwrap();
        assert_eq!(validated.user_id, "141981764");
        assert_eq!(validated.login, "twitchdev");
    }
}
