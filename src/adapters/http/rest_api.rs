//! REST implementation of the NotificationApi port.
//!
//! # Configuration
//!
//! ```ignore
//! let config = RestApiConfig::new("http://localhost:5000/api")
//!     .with_timeout(Duration::from_secs(10));
//!
//! let api = RestNotificationApi::new(config, &identity)?;
//! ```
//!
//! # Endpoints
//!
//! - `GET  {base}/notifications?page&limit&unread_only`
//! - `GET  {base}/notifications/unread-count`
//! - `PUT  {base}/notifications/{id}/read`
//! - `PUT  {base}/notifications/read-all`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

use super::dto::{ErrorBody, ListResponse, UnreadCountResponse};
use crate::domain::foundation::{Identity, NotificationId};
use crate::ports::{ApiError, NotificationApi, NotificationPage, PageRequest};

/// Configuration for the REST adapter.
#[derive(Debug, Clone)]
pub struct RestApiConfig {
    /// API root, e.g. `http://localhost:5000/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestApiConfig {
    /// Creates a configuration for the given API root.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// NotificationApi backed by the server's REST endpoints.
pub struct RestNotificationApi {
    config: RestApiConfig,
    client: Client,
    token: Secret<String>,
}

impl RestNotificationApi {
    /// Creates an adapter scoped to one identity.
    pub fn new(config: RestApiConfig, identity: &Identity) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token: identity.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/notifications{}", self.config.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token.expose_secret()))
            .header("Content-Type", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorized(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout {
                    timeout_secs: self.config.timeout.as_secs(),
                }
            } else if e.is_connect() {
                ApiError::Network(format!("connection failed: {}", e))
            } else {
                ApiError::Network(e.to_string())
            }
        })?;
        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);

        match status.as_u16() {
            401 => Err(ApiError::Unauthorized),
            404 => Err(ApiError::NotFound(message)),
            code => Err(ApiError::Status {
                status: code,
                message,
            }),
        }
    }
}

#[async_trait]
impl NotificationApi for RestNotificationApi {
    async fn list_page(&self, request: PageRequest) -> Result<NotificationPage, ApiError> {
        let builder = self.client.get(self.url("")).query(&[
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
            ("unread_only", request.unread_only.to_string()),
        ]);
        let body: ListResponse = self
            .send(builder)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        tracing::debug!(
            page = body.current_page,
            pages = body.pages,
            count = body.notifications.len(),
            "Fetched notification page"
        );
        Ok(body.into())
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        let body: UnreadCountResponse = self
            .send(self.client.get(self.url("/unread-count")))
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(body.unread_count)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), ApiError> {
        self.send(self.client.put(self.url(&format!("/{}/read", id))))
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.send(self.client.put(self.url("/read-all"))).await?;
        Ok(())
    }
}
