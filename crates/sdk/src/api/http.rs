//! HTTP client for the Soma server

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use super::models::*;
use super::SomaApi;
use crate::config::SomaConfig;
use crate::error::ApiError;

/// Soma API over HTTP
#[derive(Debug, Clone)]
pub struct HttpSomaApi {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSomaApi {
    /// Build a client from configuration
    pub fn new(config: &SomaConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.normalized_base_url().to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Build a client from environment variables
    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(&SomaConfig::from_env())
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the server to re-read the SDK's registered agents and functions
    pub async fn resync_sdk(&self) -> Result<(), ApiError> {
        let url = self.endpoint("/_internal/v1/resync_sdk");
        debug!(url = %url, "Requesting SDK resync");
        let response = self.authorized(self.client.post(&url)).send().await?;
        Self::check(response, None).await.map(|_| ())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn task_endpoint(&self, task_id: Uuid, suffix: &str) -> String {
        self.endpoint(&format!("/api/task/v1/{task_id}{suffix}"))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check(response: Response, task_id: Option<Uuid>) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(task_id) = task_id {
                return Err(ApiError::TaskNotFound(task_id));
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl SomaApi for HttpSomaApi {
    async fn task_history(
        &self,
        task_id: Uuid,
        page_size: u32,
        next_page_token: Option<String>,
    ) -> Result<PaginatedResponse<TaskTimelineItem>, ApiError> {
        let url = self.task_endpoint(task_id, "/timeline");
        let mut query = vec![("page_size", page_size.to_string())];
        if let Some(token) = next_page_token {
            query.push(("next_page_token", token));
        }

        let response = self
            .authorized(self.client.get(&url).query(&query))
            .send()
            .await?;
        let response = Self::check(response, Some(task_id)).await?;
        Self::decode(response).await
    }

    async fn send_message(
        &self,
        task_id: Uuid,
        request: CreateMessageRequest,
    ) -> Result<CreateMessageResponse, ApiError> {
        let url = self.task_endpoint(task_id, "/message");
        let response = self
            .authorized(self.client.post(&url).json(&request))
            .send()
            .await?;
        let response = Self::check(response, Some(task_id)).await?;
        Self::decode(response).await
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        request: UpdateTaskStatusRequest,
    ) -> Result<(), ApiError> {
        let url = self.task_endpoint(task_id, "");
        let response = self
            .authorized(self.client.put(&url).json(&request))
            .send()
            .await?;
        Self::check(response, Some(task_id)).await.map(|_| ())
    }
}
