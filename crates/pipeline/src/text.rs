//! Text-to-video generation.

use std::sync::Arc;

use vidchain_core::request::{GenerationRequest, OutputConfig, RequestKind, SubmitPayload};

use crate::engine::{GenerationEngine, JobOutcome, RunContext};
use crate::error::GenerationError;

/// Builds prompt-only requests and hands them to the engine.
#[derive(Clone)]
pub struct TextGenerator {
    engine: Arc<GenerationEngine>,
}

impl TextGenerator {
    pub fn new(engine: Arc<GenerationEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<GenerationEngine> {
        &self.engine
    }

    /// Generate a clip from `prompt` alone.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        config: OutputConfig,
        ctx: &RunContext,
    ) -> JobOutcome {
        match GenerationRequest::text(model, prompt, config) {
            Ok(request) => self.generate_request(&request, ctx).await,
            Err(e) => {
                let e = GenerationError::from(e);
                tracing::warn!(error = %e, "Text request rejected");
                JobOutcome::rejected(&e)
            }
        }
    }

    /// Run an already-built text request.
    pub async fn generate_request(
        &self,
        request: &GenerationRequest,
        ctx: &RunContext,
    ) -> JobOutcome {
        if !matches!(request.kind(), RequestKind::Text) {
            return JobOutcome::rejected(&GenerationError::Internal(format!(
                "text generator given a {} request",
                request.kind_label()
            )));
        }
        match SubmitPayload::from_request(request, Vec::new()) {
            Ok(payload) => self.engine.run(request, &payload, ctx).await,
            Err(e) => JobOutcome::rejected(&e.into()),
        }
    }
}
