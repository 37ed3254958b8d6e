//! Image-to-video and transition generation.
//!
//! Every input image goes through [`prepare_image`] before submission.
//! Source images and transition frames are center-cropped to the request's
//! aspect ratio; reference images are only resized and recompressed.
//! Preprocessing runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vidchain_core::image_prep::{prepare_image, PreparedImage, PreprocessConfig};
use vidchain_core::models::ModelCatalog;
use vidchain_core::request::{AspectRatio, GenerationRequest, OutputConfig, RequestKind, SubmitPayload};

use crate::config::FrameMismatchPolicy;
use crate::engine::{GenerationEngine, JobOutcome, RunContext};
use crate::error::GenerationError;

#[derive(Clone)]
pub struct ImageGenerator {
    engine: Arc<GenerationEngine>,
    catalog: ModelCatalog,
    preprocess: PreprocessConfig,
    mismatch: FrameMismatchPolicy,
}

impl ImageGenerator {
    pub fn new(engine: Arc<GenerationEngine>) -> Self {
        Self {
            engine,
            catalog: ModelCatalog::default(),
            preprocess: PreprocessConfig::default(),
            mismatch: FrameMismatchPolicy::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn with_mismatch_policy(mut self, mismatch: FrameMismatchPolicy) -> Self {
        self.mismatch = mismatch;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Animate `source`, optionally guided by up to three reference images.
    pub async fn generate_from_image(
        &self,
        model: &str,
        prompt: &str,
        config: OutputConfig,
        source: &Path,
        references: &[PathBuf],
        ctx: &RunContext,
    ) -> JobOutcome {
        let request = GenerationRequest::image(model, prompt, config, source, references.to_vec());
        match request {
            Ok(request) => self.generate(&request, ctx).await,
            Err(e) => reject(e.into()),
        }
    }

    /// Generate a transition from `first_frame` to `last_frame`.
    pub async fn generate_with_frames(
        &self,
        model: &str,
        prompt: &str,
        config: OutputConfig,
        first_frame: &Path,
        last_frame: &Path,
        ctx: &RunContext,
    ) -> JobOutcome {
        let request = GenerationRequest::transition(model, prompt, config, first_frame, last_frame);
        match request {
            Ok(request) => self.generate(&request, ctx).await,
            Err(e) => reject(e.into()),
        }
    }

    /// Preprocess the request's images and run it through the engine.
    pub async fn generate(&self, request: &GenerationRequest, ctx: &RunContext) -> JobOutcome {
        let payload = match self.build_payload(request).await {
            Ok(payload) => payload,
            Err(e) => return reject(e),
        };
        self.engine.run(request, &payload, ctx).await
    }

    async fn build_payload(
        &self,
        request: &GenerationRequest,
    ) -> Result<SubmitPayload, GenerationError> {
        request.validate()?;
        let aspect = request.config().aspect_ratio;

        let images = match request.kind() {
            RequestKind::Text => {
                return Err(GenerationError::Internal(
                    "image generator given a text request".to_string(),
                ));
            }
            RequestKind::Image { source, references } => {
                if !references.is_empty() && !self.catalog.supports_reference_images(request.model())
                {
                    return Err(GenerationError::Validation(format!(
                        "Model {} does not support reference images",
                        request.model()
                    )));
                }
                let mut images = Vec::with_capacity(references.len() + 1);
                images.push(self.prepare(source, Some(aspect)).await?.into_encoded());
                for reference in references {
                    images.push(self.prepare(reference, None).await?.into_encoded());
                }
                images
            }
            RequestKind::Transition {
                first_frame,
                last_frame,
            } => {
                let first = self.prepare(first_frame, Some(aspect)).await?;
                let last = self.prepare(last_frame, Some(aspect)).await?;
                self.check_frames(&first, &last)?;
                vec![first.into_encoded(), last.into_encoded()]
            }
        };

        Ok(SubmitPayload::from_request(request, images)?)
    }

    fn check_frames(
        &self,
        first: &PreparedImage,
        last: &PreparedImage,
    ) -> Result<(), GenerationError> {
        if (first.width, first.height) == (last.width, last.height) {
            return Ok(());
        }
        let message = format!(
            "Transition frames differ in size: {}x{} vs {}x{}",
            first.width, first.height, last.width, last.height
        );
        match self.mismatch {
            FrameMismatchPolicy::Warn => {
                tracing::warn!(
                    first = ?(first.width, first.height),
                    last = ?(last.width, last.height),
                    "Transition frames differ in size, submitting anyway"
                );
                Ok(())
            }
            FrameMismatchPolicy::Reject => Err(GenerationError::Validation(message)),
        }
    }

    async fn prepare(
        &self,
        path: &Path,
        aspect: Option<AspectRatio>,
    ) -> Result<PreparedImage, GenerationError> {
        let path = path.to_path_buf();
        let config = self.preprocess.clone();
        let prepared = tokio::task::spawn_blocking(move || prepare_image(&path, aspect, &config))
            .await
            .map_err(|e| GenerationError::Internal(format!("image preprocessing panicked: {e}")))??;
        tracing::debug!(
            width = prepared.width,
            height = prepared.height,
            encoded_bytes = prepared.encoded_bytes,
            "Image prepared"
        );
        Ok(prepared)
    }
}

fn reject(error: GenerationError) -> JobOutcome {
    tracing::warn!(error = %error, "Image request rejected");
    JobOutcome::rejected(&error)
}
