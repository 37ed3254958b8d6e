//! REST client for the generation service.
//!
//! | operation  | request                               |
//! |------------|---------------------------------------|
//! | submit     | `POST {base}/operations`              |
//! | get status | `GET {base}/operations/{id}`          |
//! | cancel     | `POST {base}/operations/{id}:cancel`  |
//!
//! Requests carry `Authorization: Bearer <key>` when a key is configured.

use std::time::Duration;

use async_trait::async_trait;
use vidchain_core::request::SubmitPayload;

use crate::messages::{OperationStatus, SubmitResponse};
use crate::service::{GenerationService, ServiceError};

/// HTTP client for one generation service endpoint.
#[derive(Clone)]
pub struct GenerationApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GenerationApi {
    /// Create a client with its own connection pool and a per-request
    /// timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn operation_url(&self, operation_id: &str) -> String {
        format!("{}/operations/{}", self.base_url, operation_id)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, classifying the
    /// failure otherwise.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ServiceError::from_http(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let response = Self::ensure_success(response).await?;
        response.json::<T>().await.map_err(map_reqwest)
    }
}

/// Map a transport error onto the service taxonomy.
fn map_reqwest(e: reqwest::Error) -> ServiceError {
    if e.is_decode() {
        ServiceError::Malformed(e.to_string())
    } else if let Some(status) = e.status() {
        ServiceError::from_http(status.as_u16(), e.to_string())
    } else {
        ServiceError::Transient(e.to_string())
    }
}

#[async_trait]
impl GenerationService for GenerationApi {
    async fn submit(&self, payload: &SubmitPayload) -> Result<String, ServiceError> {
        let response = self
            .authorize(self.client.post(format!("{}/operations", self.base_url)))
            .json(payload)
            .send()
            .await
            .map_err(map_reqwest)?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        if submitted.operation_id.trim().is_empty() {
            return Err(ServiceError::Malformed(
                "submission returned an empty operation id".to_string(),
            ));
        }
        tracing::debug!(operation_id = %submitted.operation_id, "Generation submitted");
        Ok(submitted.operation_id)
    }

    async fn get_status(&self, operation_id: &str) -> Result<OperationStatus, ServiceError> {
        let response = self
            .authorize(self.client.get(self.operation_url(operation_id)))
            .send()
            .await
            .map_err(map_reqwest)?;

        Self::parse_response(response).await
    }

    async fn cancel(&self, operation_id: &str) -> Result<bool, ServiceError> {
        let response = self
            .authorize(
                self.client
                    .post(format!("{}:cancel", self.operation_url(operation_id))),
            )
            .send()
            .await
            .map_err(map_reqwest)?;

        match response.status().as_u16() {
            404 | 409 => Ok(false),
            _ => {
                Self::ensure_success(response).await?;
                Ok(true)
            }
        }
    }
}
