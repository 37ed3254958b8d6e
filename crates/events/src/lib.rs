//! Pipeline lifecycle events.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`]: the event envelope, about a job, scene, project or
//!   merge ([`EventSubject`]).
//! - [`event_types`]: the dot-separated names the pipeline publishes.
//! - [`EventLogger`]: background subscriber that writes every event to
//!   the tracing log.

pub mod bus;
pub mod event_types;
pub mod logger;

pub use bus::{EventBus, EventSubject, PipelineEvent};
pub use logger::EventLogger;
