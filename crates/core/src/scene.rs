//! Projects and their ordered scenes.
//!
//! A [`Project`] owns its scenes as an ordinal-indexed vector: a scene's
//! `ordinal` always equals its position. Chaining refers to "the scene at
//! `ordinal - 1`", never to a stored reference, so reordering a project
//! before generation cannot leave a stale link behind.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::DEFAULT_MODEL;
use crate::outcome::FailureDetail;
use crate::request::{OutputConfig, MAX_REFERENCE_IMAGES};
use crate::status::SceneStatus;
use crate::template::PromptTemplate;
use crate::types::DbId;

/// How a scene consumes the output of the scene before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// Independent of the previous scene.
    #[default]
    None,
    /// The previous scene's last frame becomes this scene's source image.
    UsePreviousFrame,
    /// Continue the previous clip: its last frame is the source image and
    /// the previous scene's aspect ratio is kept.
    ExtendFromPrevious,
}

impl ChainMode {
    pub fn is_chained(self) -> bool {
        !matches!(self, ChainMode::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::UsePreviousFrame => "use_previous_frame",
            Self::ExtendFromPrevious => "extend_from_previous",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "use_previous_frame" => Some(Self::UsePreviousFrame),
            "extend_from_previous" => Some(Self::ExtendFromPrevious),
            _ => None,
        }
    }
}

/// Append a project-wide style template to a scene prompt.
///
/// A blank template leaves the prompt untouched. Otherwise the prompt is
/// terminated with a period (unless it already ends in `.`, `!` or `?`)
/// and joined to the template with a single space.
pub fn apply_global_template(prompt: &str, template: &str) -> String {
    let template = template.trim();
    if template.is_empty() {
        return prompt.to_string();
    }
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return template.to_string();
    }
    if prompt.ends_with(['.', '!', '?']) {
        format!("{prompt} {template}")
    } else {
        format!("{prompt}. {template}")
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// One clip in a project sequence, with its latest generation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub id: Option<DbId>,
    #[serde(default)]
    pub ordinal: usize,
    pub prompt: String,
    /// Falls back to the project default when unset.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub config: OutputConfig,
    #[serde(default)]
    pub chain_mode: ChainMode,
    /// Explicit source image (or first transition frame).
    #[serde(default)]
    pub first_frame: Option<PathBuf>,
    /// Explicit last transition frame.
    #[serde(default)]
    pub last_frame: Option<PathBuf>,
    #[serde(default)]
    pub references: Vec<PathBuf>,

    #[serde(default = "default_scene_status")]
    pub status: SceneStatus,
    #[serde(default)]
    pub asset_path: Option<PathBuf>,
    #[serde(default)]
    pub job_id: Option<DbId>,
    #[serde(default)]
    pub failure: Option<FailureDetail>,
}

fn default_scene_status() -> SceneStatus {
    SceneStatus::Pending
}

impl Scene {
    pub fn new(prompt: impl Into<String>, config: OutputConfig) -> Self {
        Self {
            id: None,
            ordinal: 0,
            prompt: prompt.into(),
            model: None,
            config,
            chain_mode: ChainMode::None,
            first_frame: None,
            last_frame: None,
            references: Vec::new(),
            status: SceneStatus::Pending,
            asset_path: None,
            job_id: None,
            failure: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_chain_mode(mut self, mode: ChainMode) -> Self {
        self.chain_mode = mode;
        self
    }

    pub fn with_first_frame(mut self, path: impl Into<PathBuf>) -> Self {
        self.first_frame = Some(path.into());
        self
    }

    pub fn with_last_frame(mut self, path: impl Into<PathBuf>) -> Self {
        self.last_frame = Some(path.into());
        self
    }

    pub fn with_references(mut self, refs: Vec<PathBuf>) -> Self {
        self.references = refs;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == SceneStatus::Completed && self.asset_path.is_some()
    }

    /// Clear the previous run's outcome before regenerating.
    pub fn reset_outcome(&mut self) {
        self.status = SceneStatus::Pending;
        self.asset_path = None;
        self.job_id = None;
        self.failure = None;
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// An ordered collection of scenes sharing a style template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: Option<DbId>,
    pub name: String,
    /// Appended to every scene prompt; blank means none.
    #[serde(default)]
    pub template: String,
    /// Structured style applied to every scene prompt before `template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<PromptTemplate>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    scenes: Vec<Scene>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            template: String::new(),
            style: None,
            default_model: default_model(),
            scenes: Vec::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_style(mut self, style: PromptTemplate) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Append a scene at the next ordinal.
    ///
    /// The first scene of a project has nothing to chain from, so a chained
    /// scene is rejected at ordinal 0.
    pub fn add_scene(&mut self, mut scene: Scene) -> Result<usize, CoreError> {
        let ordinal = self.scenes.len();
        if ordinal == 0 && scene.chain_mode.is_chained() {
            return Err(CoreError::validation(
                "The first scene cannot chain from a previous scene",
            ));
        }
        scene.ordinal = ordinal;
        self.scenes.push(scene);
        Ok(ordinal)
    }

    /// Move the scene at `from` to position `to`, renumbering ordinals.
    pub fn move_scene(&mut self, from: usize, to: usize) -> Result<(), CoreError> {
        let len = self.scenes.len();
        if from >= len || to >= len {
            return Err(CoreError::validation(format!(
                "Scene position out of range (have {len} scenes)"
            )));
        }
        let mut reordered = self.scenes.clone();
        let scene = reordered.remove(from);
        reordered.insert(to, scene);
        if reordered.first().is_some_and(|s| s.chain_mode.is_chained()) {
            return Err(CoreError::validation(
                "The first scene cannot chain from a previous scene",
            ));
        }
        self.scenes = reordered;
        self.renumber();
        Ok(())
    }

    pub fn remove_scene(&mut self, ordinal: usize) -> Result<Scene, CoreError> {
        if ordinal >= self.scenes.len() {
            return Err(CoreError::validation(format!(
                "No scene at position {ordinal}"
            )));
        }
        if ordinal == 0 && self.scenes.get(1).is_some_and(|s| s.chain_mode.is_chained()) {
            return Err(CoreError::validation(
                "Removing the first scene would leave a chained scene first",
            ));
        }
        let scene = self.scenes.remove(ordinal);
        self.renumber();
        Ok(scene)
    }

    fn renumber(&mut self) {
        for (i, scene) in self.scenes.iter_mut().enumerate() {
            scene.ordinal = i;
        }
    }

    /// Scenes in ordinal order.
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scene(&self, ordinal: usize) -> Option<&Scene> {
        self.scenes.get(ordinal)
    }

    pub fn scene_mut(&mut self, ordinal: usize) -> Option<&mut Scene> {
        self.scenes.get_mut(ordinal)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn has_chained_scenes(&self) -> bool {
        self.scenes.iter().any(|s| s.chain_mode.is_chained())
    }

    /// Prompt sent to the service for the scene at `ordinal`.
    pub fn scene_prompt(&self, ordinal: usize) -> Option<String> {
        self.scenes.get(ordinal).map(|s| {
            let prompt = match &self.style {
                Some(style) if !style.is_blank() => style.apply(&s.prompt),
                _ => s.prompt.clone(),
            };
            apply_global_template(&prompt, &self.template)
        })
    }

    /// Model for the scene at `ordinal`, falling back to the project default.
    pub fn scene_model(&self, ordinal: usize) -> Option<&str> {
        self.scenes.get(ordinal).map(|s| {
            s.model
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(&self.default_model)
        })
    }

    /// Check a deserialized project: ordinals are normalized to positions,
    /// then chaining, reference and duration rules are enforced.
    pub fn validate(&mut self) -> Result<(), CoreError> {
        self.renumber();
        if self.default_model.trim().is_empty() {
            return Err(CoreError::validation("Project default model must be set"));
        }
        for scene in &self.scenes {
            if scene.ordinal == 0 && scene.chain_mode.is_chained() {
                return Err(CoreError::validation(
                    "The first scene cannot chain from a previous scene",
                ));
            }
            if scene.references.len() > MAX_REFERENCE_IMAGES {
                return Err(CoreError::validation(format!(
                    "Scene {}: maximum {MAX_REFERENCE_IMAGES} reference images allowed",
                    scene.ordinal + 1
                )));
            }
            scene.config.validate().map_err(|e| match e {
                CoreError::Validation(msg) => {
                    CoreError::validation(format!("Scene {}: {msg}", scene.ordinal + 1))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Clear every scene's previous outcome.
    pub fn reset_outcomes(&mut self) {
        for scene in &mut self.scenes {
            scene.reset_outcome();
        }
    }

    /// True when every scene has a completed asset.
    pub fn all_completed(&self) -> bool {
        !self.scenes.is_empty() && self.scenes.iter().all(Scene::is_completed)
    }
}
