//! Generation requests: output configuration, the tagged request union, and
//! the wire payload submitted to the generation service.
//!
//! A [`GenerationRequest`] can only be built through its validating
//! constructors and exposes no mutators, so a request that exists is a
//! request that passed validation.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum prompt length, counted in characters.
pub const MAX_PROMPT_CHARS: usize = 2000;
/// Shortest clip the service accepts.
pub const MIN_DURATION_SECS: u32 = 2;
/// Longest clip the service accepts.
pub const MAX_DURATION_SECS: u32 = 60;
/// Duration used when a caller does not pick one.
pub const DEFAULT_DURATION_SECS: u32 = 5;
/// Reference images accepted alongside a source image.
pub const MAX_REFERENCE_IMAGES: usize = 3;
/// Keys that must be present in a loosely-typed output config.
pub const REQUIRED_CONFIG_KEYS: &[&str] = &["aspect_ratio", "duration", "resolution"];

// ---------------------------------------------------------------------------
// Aspect ratio
// ---------------------------------------------------------------------------

/// Supported output aspect ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AspectRatio {
    Landscape,
    Portrait,
    Square,
    Classic,
    Ultrawide,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Square,
        AspectRatio::Classic,
        AspectRatio::Ultrawide,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Square => "1:1",
            Self::Classic => "4:3",
            Self::Ultrawide => "21:9",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "Unknown aspect ratio '{s}'. Must be one of: {}",
                    Self::ALL.map(|a| a.as_str()).join(", ")
                ))
            })
    }

    /// Width divided by height.
    pub fn ratio(self) -> f64 {
        match self {
            Self::Landscape => 16.0 / 9.0,
            Self::Portrait => 9.0 / 16.0,
            Self::Square => 1.0,
            Self::Classic => 4.0 / 3.0,
            Self::Ultrawide => 21.0 / 9.0,
        }
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Supported output resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    Sd480,
    Hd720,
    FullHd1080,
    Uhd4k,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Sd480,
        Resolution::Hd720,
        Resolution::FullHd1080,
        Resolution::Uhd4k,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sd480 => "480p",
            Self::Hd720 => "720p",
            Self::FullHd1080 => "1080p",
            Self::Uhd4k => "4K",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "Unknown resolution '{s}'. Must be one of: {}",
                    Self::ALL.map(|r| r.as_str()).join(", ")
                ))
            })
    }

    /// Landscape pixel dimensions `(width, height)`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Sd480 => (854, 480),
            Self::Hd720 => (1280, 720),
            Self::FullHd1080 => (1920, 1080),
            Self::Uhd4k => (3840, 2160),
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Output config
// ---------------------------------------------------------------------------

/// Output settings shared by every request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub aspect_ratio: AspectRatio,
    #[serde(rename = "duration")]
    pub duration_secs: u32,
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub enable_audio: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Landscape,
            duration_secs: DEFAULT_DURATION_SECS,
            resolution: Resolution::Hd720,
            negative_prompt: None,
            seed: None,
            enable_audio: false,
        }
    }
}

impl OutputConfig {
    /// Build a config with the three required settings.
    pub fn new(
        aspect_ratio: AspectRatio,
        duration_secs: u32,
        resolution: Resolution,
    ) -> Result<Self, CoreError> {
        let config = Self {
            aspect_ratio,
            duration_secs,
            resolution,
            negative_prompt: None,
            seed: None,
            enable_audio: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        let negative = negative.into();
        self.negative_prompt = (!negative.trim().is_empty()).then_some(negative);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.enable_audio = enabled;
        self
    }

    /// Parse a loosely-typed JSON object, reporting the first missing
    /// required key by name.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::validation("Output config must be a JSON object"))?;

        for key in REQUIRED_CONFIG_KEYS {
            if !obj.contains_key(*key) {
                return Err(CoreError::validation(format!(
                    "Missing required config key: {key}"
                )));
            }
        }

        let config: OutputConfig = serde_json::from_value(value.clone())
            .map_err(|e| CoreError::validation(format!("Invalid output config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_duration(self.duration_secs)
    }
}

/// Check a clip duration against the service limits.
pub fn validate_duration(duration_secs: u32) -> Result<(), CoreError> {
    if (MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration_secs) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "Duration must be between {MIN_DURATION_SECS} and {MAX_DURATION_SECS} seconds (got {duration_secs})"
        )))
    }
}

/// Check a prompt is non-blank and at most [`MAX_PROMPT_CHARS`] characters.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::validation("Prompt cannot be empty"));
    }
    let chars = prompt.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(CoreError::validation(format!(
            "Prompt too long ({chars} chars). Max {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_model(model: &str) -> Result<(), CoreError> {
    if model.trim().is_empty() {
        Err(CoreError::validation("Model must be specified"))
    } else {
        Ok(())
    }
}

fn validate_path(path: &Path, what: &str) -> Result<(), CoreError> {
    if path.as_os_str().is_empty() {
        Err(CoreError::validation(format!("{what} path must not be empty")))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generation request
// ---------------------------------------------------------------------------

/// Inputs specific to each generation mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RequestKind {
    /// Prompt only.
    Text,
    /// Animate a source image, optionally guided by reference images.
    Image {
        source: PathBuf,
        references: Vec<PathBuf>,
    },
    /// Interpolate between two explicit frames.
    Transition {
        first_frame: PathBuf,
        last_frame: PathBuf,
    },
}

/// A validated, immutable generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    model: String,
    prompt: String,
    config: OutputConfig,
    kind: RequestKind,
}

impl GenerationRequest {
    pub fn text(
        model: impl Into<String>,
        prompt: impl Into<String>,
        config: OutputConfig,
    ) -> Result<Self, CoreError> {
        Self::build(model.into(), prompt.into(), config, RequestKind::Text)
    }

    pub fn image(
        model: impl Into<String>,
        prompt: impl Into<String>,
        config: OutputConfig,
        source: impl Into<PathBuf>,
        references: Vec<PathBuf>,
    ) -> Result<Self, CoreError> {
        Self::build(
            model.into(),
            prompt.into(),
            config,
            RequestKind::Image {
                source: source.into(),
                references,
            },
        )
    }

    pub fn transition(
        model: impl Into<String>,
        prompt: impl Into<String>,
        config: OutputConfig,
        first_frame: impl Into<PathBuf>,
        last_frame: impl Into<PathBuf>,
    ) -> Result<Self, CoreError> {
        Self::build(
            model.into(),
            prompt.into(),
            config,
            RequestKind::Transition {
                first_frame: first_frame.into(),
                last_frame: last_frame.into(),
            },
        )
    }

    fn build(
        model: String,
        prompt: String,
        config: OutputConfig,
        kind: RequestKind,
    ) -> Result<Self, CoreError> {
        let request = Self {
            model,
            prompt,
            config,
            kind,
        };
        request.validate()?;
        Ok(request)
    }

    /// Re-run every construction check.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_prompt(&self.prompt)?;
        validate_model(&self.model)?;
        self.config.validate()?;
        match &self.kind {
            RequestKind::Text => {}
            RequestKind::Image { source, references } => {
                validate_path(source, "Source image")?;
                if references.len() > MAX_REFERENCE_IMAGES {
                    return Err(CoreError::validation(format!(
                        "Maximum {MAX_REFERENCE_IMAGES} reference images allowed (got {})",
                        references.len()
                    )));
                }
                for r in references {
                    validate_path(r, "Reference image")?;
                }
            }
            RequestKind::Transition {
                first_frame,
                last_frame,
            } => {
                validate_path(first_frame, "First frame")?;
                validate_path(last_frame, "Last frame")?;
            }
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Wire name of the request mode.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            RequestKind::Text => "text_to_video",
            RequestKind::Image { .. } => "image_to_video",
            RequestKind::Transition { .. } => "transition",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// A preprocessed image in transport-safe form.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct EncodedImage {
    pub mime_type: String,
    /// Standard base64 of the encoded image bytes.
    pub data: String,
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Body of a submission to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmitPayload {
    TextToVideo {
        model: String,
        prompt: String,
        config: OutputConfig,
    },
    ImageToVideo {
        model: String,
        prompt: String,
        config: OutputConfig,
        image: EncodedImage,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        reference_images: Vec<EncodedImage>,
    },
    Transition {
        model: String,
        prompt: String,
        config: OutputConfig,
        first_frame: EncodedImage,
        last_frame: EncodedImage,
    },
}

impl SubmitPayload {
    /// Build the payload for `request` from its already-encoded images.
    ///
    /// Image requests take the source first, then references in order.
    /// Transition requests take exactly the first and last frame.
    pub fn from_request(
        request: &GenerationRequest,
        images: Vec<EncodedImage>,
    ) -> Result<Self, CoreError> {
        let model = request.model.clone();
        let prompt = request.prompt.clone();
        let config = request.config.clone();

        match &request.kind {
            RequestKind::Text => {
                if !images.is_empty() {
                    return Err(CoreError::Internal(
                        "text requests carry no images".to_string(),
                    ));
                }
                Ok(Self::TextToVideo {
                    model,
                    prompt,
                    config,
                })
            }
            RequestKind::Image { references, .. } => {
                if images.len() != references.len() + 1 {
                    return Err(CoreError::Internal(format!(
                        "expected {} encoded images, got {}",
                        references.len() + 1,
                        images.len()
                    )));
                }
                let mut images = images.into_iter();
                let image = images
                    .next()
                    .ok_or_else(|| CoreError::Internal("missing source image".to_string()))?;
                Ok(Self::ImageToVideo {
                    model,
                    prompt,
                    config,
                    image,
                    reference_images: images.collect(),
                })
            }
            RequestKind::Transition { .. } => {
                let [first_frame, last_frame]: [EncodedImage; 2] =
                    images.try_into().map_err(|v: Vec<EncodedImage>| {
                        CoreError::Internal(format!("expected 2 frames, got {}", v.len()))
                    })?;
                Ok(Self::Transition {
                    model,
                    prompt,
                    config,
                    first_frame,
                    last_frame,
                })
            }
        }
    }
}
