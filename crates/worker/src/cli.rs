use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vidchain_core::error::CoreError;
use vidchain_core::request::{
    AspectRatio, GenerationRequest, OutputConfig, Resolution, DEFAULT_DURATION_SECS,
};
use vidchain_core::template::PromptTemplate;

/// Video generation worker: single clips, chained scene sequences and
/// merges.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate one clip from a prompt, optionally starting from images
    Generate(GenerateArgs),

    /// Generate every scene of a project file in order
    Sequence {
        /// Project JSON file
        #[arg(value_name = "PROJECT")]
        project: PathBuf,

        /// Concatenate the finished scenes when all of them complete
        #[arg(long)]
        merge: bool,

        /// Merged output path (default: MERGED_DIR/merged_<timestamp>.mp4)
        #[arg(short = 'o', long, value_name = "FILE", requires = "merge")]
        output: Option<PathBuf>,

        /// Write the updated project (statuses, clip paths) back to the file
        #[arg(long)]
        save: bool,
    },

    /// Concatenate existing clips in the given order
    Merge {
        #[arg(value_name = "VIDEO", required = true, num_args = 1..)]
        videos: Vec<PathBuf>,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print duration, resolution, frame rate and codec of a clip
    Probe {
        #[arg(value_name = "VIDEO")]
        video: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(short = 'p', long)]
    pub prompt: String,

    /// Source image (image-to-video) or first transition frame
    #[arg(short = 'i', long, value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// Last transition frame (requires --image)
    #[arg(long, value_name = "IMAGE")]
    pub last_frame: Option<PathBuf>,

    /// Style reference image, up to three (can be specified multiple times)
    #[arg(short = 'r', long = "reference", value_name = "IMAGE")]
    pub references: Vec<PathBuf>,

    /// Model name (default: DEFAULT_MODEL)
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    #[arg(short = 'a', long, default_value = "16:9", value_name = "RATIO")]
    pub aspect: String,

    /// Clip length in seconds
    #[arg(short = 'd', long, default_value_t = DEFAULT_DURATION_SECS, value_name = "SECS")]
    pub duration: u32,

    #[arg(long, default_value = "720p")]
    pub resolution: String,

    #[arg(long)]
    pub negative_prompt: Option<String>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Prompt template JSON (base style, camera, lighting, color, audio)
    #[arg(short = 't', long, value_name = "FILE")]
    pub template: Option<PathBuf>,
}

impl GenerateArgs {
    /// Apply `style` to the prompt.
    pub fn styled(mut self, style: &PromptTemplate) -> Self {
        self.prompt = style.apply(&self.prompt);
        self
    }

    /// Validate the arguments into a request, picking the mode from the
    /// images given.
    pub fn to_request(&self, default_model: &str) -> Result<GenerationRequest, CoreError> {
        let mut config = OutputConfig::new(
            AspectRatio::parse(&self.aspect)?,
            self.duration,
            Resolution::parse(&self.resolution)?,
        )?;
        if let Some(negative) = &self.negative_prompt {
            config = config.with_negative_prompt(negative.clone());
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }

        let model = self.model.as_deref().unwrap_or(default_model);

        match (&self.image, &self.last_frame) {
            (Some(first), Some(last)) => {
                if !self.references.is_empty() {
                    return Err(CoreError::validation(
                        "Reference images cannot be combined with transition frames",
                    ));
                }
                GenerationRequest::transition(model, &self.prompt, config, first, last)
            }
            (Some(source), None) => GenerationRequest::image(
                model,
                &self.prompt,
                config,
                source,
                self.references.clone(),
            ),
            (None, Some(_)) => Err(CoreError::validation(
                "--last-frame requires --image for the first frame",
            )),
            (None, None) if !self.references.is_empty() => Err(CoreError::validation(
                "Reference images require a source image (--image)",
            )),
            (None, None) => GenerationRequest::text(model, &self.prompt, config),
        }
    }
}
