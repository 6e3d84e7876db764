use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::subscription::{SubscriptionRecord, SubscriptionRequest};

pub const EVENTSUB_API_URL: &str = "https://api.twitch.tv/helix/eventsub/subscriptions";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN)
    }

    /// Response body for status errors, the display text otherwise.
    #[must_use]
    pub fn raw(&self) -> String {
        match self {
            Self::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Per-item result of a batched create.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<SubscriptionRecord>,
    pub failed: Vec<(SubscriptionRequest, ApiError)>,
}

/// The subscription calls the reconciler relies on.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn list(&self) -> Result<Vec<SubscriptionRecord>, ApiError>;

    async fn batch_create(&self, requests: &[SubscriptionRequest]) -> BatchOutcome;

    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// Deletes every subscription visible to the current credentials.
    async fn delete_all(&self) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Transport {
    Websocket { session_id: String },
}

impl Transport {
    pub fn websocket(session_id: impl Into<String>) -> Self {
        Self::Websocket {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Websocket { session_id } => session_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    #[serde(rename = "type")]
    sub_type: &'a str,
    version: &'a str,
    condition: serde_json::Value,
    transport: &'a Transport,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    data: Vec<SubscriptionRecord>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    data: Vec<SubscriptionRecord>,
}

/// [`SubscriptionApi`] backed by the Helix EventSub endpoints.
#[non_exhaustive]
pub struct HelixSubscriptionApi {
    client: Client,
    client_id: String,
    access_token: String,
    transport: Transport,
    url: String,
}

impl HelixSubscriptionApi {
    #[must_use]
    pub fn new(client: Client, client_id: String, access_token: String, transport: Transport) -> Self {
        Self {
            client,
            client_id,
            access_token,
            transport,
            url: EVENTSUB_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Client-Id", &self.client_id)
    }

    async fn create(&self, request: &SubscriptionRequest) -> Result<SubscriptionRecord, ApiError> {
        let body = CreateBody {
            sub_type: request.kind.as_str(),
            version: request.kind.version(),
            condition: request.condition(),
            transport: &self.transport,
        };

        let response = self
            .authorized(self.client.post(&self.url))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let text = response.text().await?;
        let created: CreateResponse = decode(&text)?;
        created
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Decode(format!("create returned no subscription: {text}")))
    }
}

#[async_trait]
impl SubscriptionApi for HelixSubscriptionApi {
    async fn list(&self) -> Result<Vec<SubscriptionRecord>, ApiError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut builder = self.authorized(self.client.get(&self.url));
            if let Some(after) = &cursor {
                builder = builder.query(&[("after", after)]);
            }

            let response = check_status(builder.send().await?).await?;
            let page: ListPage = decode(&response.text().await?)?;
            records.extend(page.data);

            match page.pagination.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!("listed {} EventSub subscriptions", records.len());
        Ok(records)
    }

    async fn batch_create(&self, requests: &[SubscriptionRequest]) -> BatchOutcome {
        let results = join_all(requests.iter().map(|request| self.create(request))).await;

        let mut outcome = BatchOutcome::default();
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(record) => {
                    info!("subscribed to {}", request);
                    outcome.succeeded.push(record);
                }
                Err(e) => outcome.failed.push((request.clone(), e)),
            }
        }
        outcome
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .authorized(self.client.delete(&self.url))
            .query(&[("id", id)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), ApiError> {
        let records = self.list().await?;
        info!("deleting all {} EventSub subscriptions", records.len());

        for record in records {
            if let Err(e) = self.delete(&record.id).await {
                warn!(
                    "failed to delete subscription {} ({}): {}",
                    record.id, record.kind, e
                );
            }
        }
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode(format!("{e}: {text}")))
}
