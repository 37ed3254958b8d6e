//! Background subscriber that mirrors bus events into the tracing log.

use tokio::sync::broadcast;

use crate::bus::{EventSubject, PipelineEvent};
use crate::event_types;

pub struct EventLogger;

impl EventLogger {
    /// Log every event until the bus is dropped. Returns the number of
    /// events seen.
    pub async fn run(mut receiver: broadcast::Receiver<PipelineEvent>) -> u64 {
        let mut seen = 0u64;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    seen += 1;
                    Self::log(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(seen, "Event bus closed, logger shutting down");
                    break;
                }
            }
        }
        seen
    }

    fn log(event: &PipelineEvent) {
        let subject = match &event.subject {
            EventSubject::Job { id } => format!("job {id}"),
            EventSubject::Scene { id: Some(id), ordinal } => format!("scene {id} (#{ordinal})"),
            EventSubject::Scene { id: None, ordinal } => format!("scene #{ordinal}"),
            EventSubject::Project { name, .. } => format!("project {name}"),
            EventSubject::Merge => "merge".to_string(),
        };
        if event.is_failure() {
            tracing::warn!(
                event_type = event.event_type,
                subject = %subject,
                payload = %event.payload,
                "Pipeline event"
            );
        } else if event.event_type == event_types::JOB_PROGRESS {
            tracing::trace!(subject = %subject, payload = %event.payload, "Progress event");
        } else {
            tracing::info!(
                event_type = event.event_type,
                subject = %subject,
                payload = %event.payload,
                "Pipeline event"
            );
        }
    }
}
