//! Known generation models and their capability flags.

use std::collections::HashMap;

/// Model used when neither the scene nor the caller names one.
pub const DEFAULT_MODEL: &str = "veo-2.0";

/// Capability flags a generator checks before building a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Accepts up to three reference images alongside the source image.
    pub reference_images: bool,
}

/// Lookup table of model ids to capabilities.
///
/// Unknown model ids are allowed through (the service is the final judge)
/// but report no capabilities.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<String, ModelCapabilities>,
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    pub fn with_model(mut self, id: impl Into<String>, caps: ModelCapabilities) -> Self {
        self.models.insert(id.into(), caps);
        self
    }

    pub fn capabilities(&self, model: &str) -> ModelCapabilities {
        self.models.get(model).copied().unwrap_or_default()
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn supports_reference_images(&self, model: &str) -> bool {
        self.capabilities(model).reference_images
    }

    /// Known model ids, sorted.
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let plain = ModelCapabilities::default();
        let with_refs = ModelCapabilities {
            reference_images: true,
        };
        Self::empty()
            .with_model("veo-1.0", plain)
            .with_model("veo-lite", plain)
            .with_model("veo-2.0", plain)
            .with_model("veo-3.0", with_refs)
            .with_model("veo-3.1", with_refs)
    }
}
