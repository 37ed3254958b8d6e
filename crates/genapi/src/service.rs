//! The generation service contract.

use async_trait::async_trait;
use vidchain_core::request::SubmitPayload;

use crate::messages::OperationStatus;

/// Errors surfaced by a [`GenerationService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Network-level failure worth retrying (connect, timeout, 5xx).
    #[error("transient service error: {0}")]
    Transient(String),

    /// Quota or rate limit hit. Never retried.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The service refused the request.
    #[error("service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The service answered with something this client cannot parse.
    #[error("malformed service response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a non-2xx response.
    pub fn from_http(status: u16, body: String) -> Self {
        if status == 429 || is_quota_message(&body) {
            Self::Quota(body)
        } else if status == 408 || status >= 500 {
            Self::Transient(format!("HTTP {status}: {body}"))
        } else {
            Self::Rejected {
                status,
                message: body,
            }
        }
    }
}

/// True when `message` reads like a quota or rate-limit refusal.
pub fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["quota", "rate limit", "resource_exhausted"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Submit / status / cancel against an asynchronous generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Queue a generation and return the service's operation id.
    async fn submit(&self, payload: &SubmitPayload) -> Result<String, ServiceError>;

    async fn get_status(&self, operation_id: &str) -> Result<OperationStatus, ServiceError>;

    /// Ask the service to stop an operation. `Ok(false)` means the service
    /// no longer knows the operation or it already finished.
    async fn cancel(&self, operation_id: &str) -> Result<bool, ServiceError>;
}
