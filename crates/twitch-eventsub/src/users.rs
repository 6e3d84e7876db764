use reqwest::Client;
use serde::Deserialize;

use crate::eventsub::ApiError;

const USERS_API_URL: &str = "https://api.twitch.tv/helix/users";
/// Helix accepts at most this many `login` parameters per call.
const MAX_LOGINS_PER_REQUEST: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

#[derive(Deserialize)]
struct UsersResponse {
    data: Vec<HelixUser>,
}

#[non_exhaustive]
pub struct UsersClient {
    client: Client,
    client_id: String,
    access_token: String,
    url: String,
}

impl UsersClient {
    #[must_use]
    pub fn new(client: Client, client_id: String, access_token: String) -> Self {
        Self {
            client,
            client_id,
            access_token,
            url: USERS_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Looks up users by login name. Unknown logins are simply absent from
    /// the result.
    pub async fn by_logins(&self, logins: &[&str]) -> Result<Vec<HelixUser>, ApiError> {
        let mut users = Vec::with_capacity(logins.len());

        for chunk in logins.chunks(MAX_LOGINS_PER_REQUEST) {
            let query: Vec<(&str, &str)> = chunk.iter().map(|login| ("login", *login)).collect();

            let response = self
                .client
                .get(&self.url)
                .header("Authorization", format!("Bearer {}", self.access_token))
                .header("Client-Id", &self.client_id)
                .query(&query)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(ApiError::Status { status, body });
            }

            let page: UsersResponse = serde_json::from_str(&body)
                .map_err(|e| ApiError::Decode(format!("{e}: {body}")))?;
            users.extend(page.data);
        }

        Ok(users)
    }

    pub async fn by_login(&self, login: &str) -> Result<Option<HelixUser>, ApiError> {
        let login = login.trim_start_matches('#').to_lowercase();
        Ok(self.by_logins(&[login.as_str()]).await?.into_iter().next())
    }
}
