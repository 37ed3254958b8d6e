//! Failure taxonomy shared by the engine, generators, orchestrator and store.
//!
//! Errors never cross the orchestrator boundary as `Err`: they are folded
//! into a [`FailureDetail`] carrying a machine-readable [`FailureKind`] and
//! a human-readable message.

use serde::{Deserialize, Serialize};

/// Classification of a failed generation, extraction or merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad input. Never retried.
    Validation,
    /// The generation service refused for quota / rate-limit reasons.
    QuotaExceeded,
    /// The polling budget was exhausted.
    Timeout,
    /// The generation service reported a failed operation.
    GenerationFailed,
    /// Network failure that survived every retry.
    TransientNetwork,
    /// The finished asset could not be downloaded.
    Download,
    /// A frame could not be extracted from a prior asset.
    Extraction,
    /// Concatenation failed.
    Merge,
    /// A chained prerequisite scene did not complete.
    DependencyFailed,
    /// Stopped by the caller.
    Cancelled,
    /// The persistent store rejected a write.
    Store,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Timeout => "timeout",
            Self::GenerationFailed => "generation_failed",
            Self::TransientNetwork => "transient_network",
            Self::Download => "download",
            Self::Extraction => "extraction",
            Self::Merge => "merge",
            Self::DependencyFailed => "dependency_failed",
            Self::Cancelled => "cancelled",
            Self::Store => "store",
        }
    }

    /// Parse the stored string form back into a kind.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "validation" => Self::Validation,
            "quota_exceeded" => Self::QuotaExceeded,
            "timeout" => Self::Timeout,
            "generation_failed" => Self::GenerationFailed,
            "transient_network" => Self::TransientNetwork,
            "download" => Self::Download,
            "extraction" => Self::Extraction,
            "merge" => Self::Merge,
            "dependency_failed" => Self::DependencyFailed,
            "cancelled" => Self::Cancelled,
            "store" => Self::Store,
            _ => return None,
        })
    }

    /// Only transient network failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransientNetwork)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{kind, message}` pair attached to every failed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
