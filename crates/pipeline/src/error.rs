//! The engine's error taxonomy.
//!
//! Generators and the engine return [`GenerationError`] internally; at the
//! engine boundary every error is folded into a
//! [`FailureDetail`](vidchain_core::outcome::FailureDetail) on the job
//! outcome.

use vidchain_core::error::CoreError;
use vidchain_core::outcome::{FailureDetail, FailureKind};
use vidchain_core::store::StoreError;
use vidchain_core::types::DbId;
use vidchain_genapi::service::is_quota_message;
use vidchain_genapi::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Generation timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Frame extraction failed: {0}")]
    Extraction(String),

    #[error("{0}")]
    DependencyFailed(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Job {0} is already being polled")]
    AlreadyPolling(DbId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::GenerationFailed(_) | Self::AlreadyPolling(_) | Self::Internal(_) => {
                FailureKind::GenerationFailed
            }
            Self::TransientNetwork(_) => FailureKind::TransientNetwork,
            Self::Download(_) => FailureKind::Download,
            Self::Extraction(_) => FailureKind::Extraction,
            Self::DependencyFailed(_) => FailureKind::DependencyFailed,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Store(_) => FailureKind::Store,
        }
    }

    pub fn detail(&self) -> FailureDetail {
        FailureDetail::new(self.kind(), self.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Classify a failure reported by the service for a finished operation.
    pub fn from_operation_failure(code: Option<i32>, message: String) -> Self {
        if code == Some(429) || is_quota_message(&message) {
            Self::QuotaExceeded(message)
        } else {
            Self::GenerationFailed(message)
        }
    }
}

impl From<CoreError> for GenerationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::NotFound { .. } | CoreError::Conflict(_) => Self::Validation(e.to_string()),
            CoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<ServiceError> for GenerationError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Transient(msg) => Self::TransientNetwork(msg),
            ServiceError::Quota(msg) => Self::QuotaExceeded(msg),
            ServiceError::Rejected { status, message } => {
                Self::GenerationFailed(format!("service rejected request ({status}): {message}"))
            }
            ServiceError::Malformed(msg) => Self::GenerationFailed(msg),
        }
    }
}
