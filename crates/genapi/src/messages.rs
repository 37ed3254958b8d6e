//! Wire types returned by the generation service.
//!
//! A status poll returns
//! `{"stage": "...", "progress": 0-100?, "label": "...", "result_url": "...", "error": {...}}`
//! where only `stage` is required.

use serde::Deserialize;

/// Response to a submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(alias = "name", alias = "id")]
    pub operation_id: String,
}

/// Coarse lifecycle stage reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStage {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Any stage this client does not know about; treated as in-flight.
    #[serde(other)]
    Unknown,
}

/// Error body attached to a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i32>,
    pub message: String,
}

/// One status poll result.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    pub stage: OperationStage,
    /// Service-side completion estimate, 0-100.
    #[serde(default, rename = "progress")]
    pub progress_hint: Option<u8>,
    /// Free-form stage description for progress labels.
    #[serde(default, rename = "label")]
    pub stage_label: Option<String>,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl OperationStatus {
    pub fn in_flight(progress_hint: Option<u8>) -> Self {
        Self {
            stage: OperationStage::Running,
            progress_hint,
            stage_label: None,
            result_url: None,
            error: None,
        }
    }

    pub fn succeeded(result_url: impl Into<String>) -> Self {
        Self {
            stage: OperationStage::Succeeded,
            progress_hint: Some(100),
            stage_label: None,
            result_url: Some(result_url.into()),
            error: None,
        }
    }

    pub fn failed(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            stage: OperationStage::Failed,
            progress_hint: None,
            stage_label: None,
            result_url: None,
            error: Some(OperationError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.stage,
            OperationStage::Succeeded | OperationStage::Failed | OperationStage::Cancelled
        )
    }

    /// Error text for a failed operation, falling back to the stage label.
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.message.clone())
            .or_else(|| self.stage_label.clone())
            .unwrap_or_else(|| "generation failed without an error message".to_string())
    }
}
