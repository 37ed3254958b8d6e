//! Domain types and pure logic for the video generation pipeline.
//!
//! Nothing in this crate talks to the network or a database. Subprocess
//! helpers for ffmpeg/ffprobe live in [`ffmpeg`]; image preprocessing in
//! [`image_prep`]. The [`store::JobStore`] trait is the seam the pipeline
//! uses to persist job and scene transitions.

pub mod error;
pub mod ffmpeg;
pub mod image_prep;
pub mod models;
pub mod naming;
pub mod outcome;
pub mod progress;
pub mod request;
pub mod retry;
pub mod scene;
pub mod status;
pub mod store;
pub mod template;
pub mod types;
