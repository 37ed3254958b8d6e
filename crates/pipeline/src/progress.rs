//! Progress observers.
//!
//! A single job reports `(percent, label)` through a [`ProgressSink`]; a
//! sequence reports `(index, total, stage, message)` through a
//! [`SequenceProgress`]. Closures implement both.

use tokio::sync::mpsc;
use vidchain_core::progress::ProgressTracker;

/// Receives per-job progress.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, label: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, label: &str) {
        self(percent, label)
    }
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8, _label: &str) {}
}

/// One progress report sent over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub label: String,
}

/// Forwards progress to an unbounded channel.
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, percent: u8, label: &str) {
        // A dropped receiver just means nobody is watching.
        let _ = self.sender.send(ProgressUpdate {
            percent,
            label: label.to_string(),
        });
    }
}

/// Wraps a sink so a job's reported progress never goes backwards.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    tracker: ProgressTracker,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            tracker: ProgressTracker::new(),
        }
    }

    /// Forward `percent` if it advances; returns the value forwarded.
    pub fn report(&mut self, percent: u8, label: &str) -> Option<u8> {
        let advanced = self.tracker.advance(percent)?;
        self.sink.report(advanced, label);
        Some(advanced)
    }

    pub fn current(&self) -> u8 {
        self.tracker.current()
    }
}

// ---------------------------------------------------------------------------
// Sequence progress
// ---------------------------------------------------------------------------

/// Stage names passed to [`SequenceProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStage {
    Processing,
    Completed,
    Failed,
    Cancelled,
    Skipped,
    Done,
}

impl SequenceStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for SequenceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives one call per scene transition plus a final `Done`.
pub trait SequenceProgress: Send + Sync {
    fn on_scene(&self, index: usize, total: usize, stage: SequenceStage, message: &str);
}

impl<F> SequenceProgress for F
where
    F: Fn(usize, usize, SequenceStage, &str) + Send + Sync,
{
    fn on_scene(&self, index: usize, total: usize, stage: SequenceStage, message: &str) {
        self(index, total, stage, message)
    }
}

pub struct NoSequenceProgress;

impl SequenceProgress for NoSequenceProgress {
    fn on_scene(&self, _: usize, _: usize, _: SequenceStage, _: &str) {}
}
