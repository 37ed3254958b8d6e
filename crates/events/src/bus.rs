//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the engine, the
//! orchestrator and the merger, and drained by the worker's
//! [`EventLogger`].
//!
//! [`EventLogger`]: crate::logger::EventLogger

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use vidchain_core::types::DbId;

use crate::event_types;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// What an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventSubject {
    Job { id: DbId },
    /// `id` is unset only when the scene record could not be created.
    Scene { id: Option<DbId>, ordinal: usize },
    Project { id: Option<DbId>, name: String },
    Merge,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    /// One of [`event_types`].
    pub event_type: &'static str,
    pub subject: EventSubject,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    fn new(event_type: &'static str, subject: EventSubject) -> Self {
        Self {
            event_type,
            subject,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn job(event_type: &'static str, job_id: DbId) -> Self {
        Self::new(event_type, EventSubject::Job { id: job_id })
    }

    pub fn scene(event_type: &'static str, scene_id: Option<DbId>, ordinal: usize) -> Self {
        Self::new(
            event_type,
            EventSubject::Scene {
                id: scene_id,
                ordinal,
            },
        )
    }

    pub fn project(event_type: &'static str, id: Option<DbId>, name: impl Into<String>) -> Self {
        Self::new(
            event_type,
            EventSubject::Project {
                id,
                name: name.into(),
            },
        )
    }

    pub fn merge_completed() -> Self {
        Self::new(event_types::MERGE_COMPLETED, EventSubject::Merge)
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Job or scene failures, including timeouts.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.event_type,
            event_types::JOB_FAILED | event_types::JOB_TIMED_OUT | event_types::SCENE_FAILED
        )
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest unread events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if there are none.
    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
