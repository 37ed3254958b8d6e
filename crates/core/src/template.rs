//! Structured prompt templates.
//!
//! A [`PromptTemplate`] carries the style components appended to a prompt,
//! in this order:
//!
//! | Component    | Example                        |
//! |--------------|--------------------------------|
//! | `base_style` | `cinematic film still`         |
//! | `camera`     | `slow dolly-in`                |
//! | `lighting`   | `golden hour backlight`        |
//! | `color`      | `warm teal and orange palette` |
//! | `audio`      | `soft piano score`             |

use serde::{Deserialize, Serialize};

/// Punctuation a component may already end with.
const TERMINATORS: [char; 6] = ['.', '!', '?', ',', ';', ':'];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplate {
    pub name: String,
    pub category: String,
    pub base_style: String,
    pub camera: String,
    pub lighting: String,
    pub color: String,
    pub audio: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_base_style(mut self, text: impl Into<String>) -> Self {
        self.base_style = text.into();
        self
    }

    pub fn with_camera(mut self, text: impl Into<String>) -> Self {
        self.camera = text.into();
        self
    }

    pub fn with_lighting(mut self, text: impl Into<String>) -> Self {
        self.lighting = text.into();
        self
    }

    pub fn with_color(mut self, text: impl Into<String>) -> Self {
        self.color = text.into();
        self
    }

    pub fn with_audio(mut self, text: impl Into<String>) -> Self {
        self.audio = text.into();
        self
    }

    /// Combine `prompt` with the template's components.
    ///
    /// Blank parts are dropped, each remaining part is trimmed and
    /// terminated with a period unless it already ends in punctuation,
    /// and the parts are joined with single spaces.
    pub fn apply(&self, prompt: &str) -> String {
        let parts = [
            prompt,
            self.base_style.as_str(),
            self.camera.as_str(),
            self.lighting.as_str(),
            self.color.as_str(),
            self.audio.as_str(),
        ];
        let applied = parts
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .map(|part| {
                if part.ends_with(TERMINATORS) {
                    part.to_string()
                } else {
                    format!("{part}.")
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(template = %self.name, length = applied.len(), "Applied prompt template");
        applied
    }

    /// True when no component would change a prompt.
    pub fn is_blank(&self) -> bool {
        [
            &self.base_style,
            &self.camera,
            &self.lighting,
            &self.color,
            &self.audio,
        ]
        .iter()
        .all(|part| part.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noir() -> PromptTemplate {
        PromptTemplate::new("Noir")
            .with_base_style("black and white film noir")
            .with_camera("low angle tracking shot")
            .with_lighting("hard shadows")
            .with_color("high contrast monochrome")
            .with_audio("muted jazz")
    }

    #[test]
    fn components_follow_prompt_in_order() {
        assert_eq!(
            noir().apply("A detective lights a cigarette"),
            "A detective lights a cigarette. black and white film noir. \
             low angle tracking shot. hard shadows. high contrast monochrome. muted jazz."
        );
    }

    #[test]
    fn blank_components_are_skipped() {
        let template = PromptTemplate::new("Sparse")
            .with_camera("  aerial drone shot ")
            .with_audio("   ");
        assert_eq!(
            template.apply("Fields of lavender"),
            "Fields of lavender. aerial drone shot."
        );
    }

    #[test]
    fn existing_punctuation_is_kept() {
        let template = PromptTemplate::new("Punct")
            .with_base_style("anime,")
            .with_lighting("neon glow;")
            .with_color("vivid!");
        assert_eq!(
            template.apply("Where is everyone?"),
            "Where is everyone? anime, neon glow; vivid!"
        );
    }

    #[test]
    fn empty_prompt_yields_components_only() {
        let template = PromptTemplate::new("Style").with_base_style("watercolor");
        assert_eq!(template.apply("  "), "watercolor.");
        assert_eq!(PromptTemplate::default().apply(""), "");
    }

    #[test]
    fn blank_template_detected() {
        assert!(PromptTemplate::new("Empty").with_camera(" ").is_blank());
        assert!(!noir().is_blank());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let template: PromptTemplate = serde_json::from_value(serde_json::json!({
            "name": "Cinematic",
            "base_style": "cinematic",
            "lighting": "soft key light"
        }))
        .unwrap();
        assert_eq!(template.camera, "");
        assert_eq!(template.apply("A boat"), "A boat. cinematic. soft key light.");
    }
}
