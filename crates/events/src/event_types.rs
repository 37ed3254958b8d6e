//! Event names published by the pipeline.

pub const JOB_SUBMITTED: &str = "job.submitted";
pub const JOB_PROGRESS: &str = "job.progress";
pub const JOB_COMPLETED: &str = "job.completed";
pub const JOB_FAILED: &str = "job.failed";
pub const JOB_TIMED_OUT: &str = "job.timed_out";
pub const JOB_CANCELLED: &str = "job.cancelled";

pub const SCENE_STARTED: &str = "scene.started";
pub const SCENE_COMPLETED: &str = "scene.completed";
pub const SCENE_FAILED: &str = "scene.failed";
pub const SCENE_SKIPPED: &str = "scene.skipped";

pub const SEQUENCE_COMPLETED: &str = "sequence.completed";
pub const MERGE_COMPLETED: &str = "merge.completed";
