//! End-to-end engine behavior against scripted service fakes: lifecycle,
//! progress, retries, failure classification, timeouts, downloads and
//! cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{DownloadMode, FakeDownloader, FakeToolkit, Harness, ScriptedService};
use tokio_util::sync::CancellationToken;
use vidchain_core::outcome::FailureKind;
use vidchain_core::request::{AspectRatio, OutputConfig, Resolution};
use vidchain_core::status::JobStatus;
use vidchain_core::store::JobStore;
use vidchain_events::{event_types, EventBus};
use vidchain_genapi::{OperationStatus, ServiceError};
use vidchain_pipeline::progress::{ChannelProgress, NoProgress, ProgressReporter};
use vidchain_pipeline::{GenerationEngine, GenerationError, RunContext};

fn hd_config() -> OutputConfig {
    OutputConfig::new(AspectRatio::Landscape, 5, Resolution::FullHd1080).unwrap()
}

fn files_in(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Test: happy path
// ---------------------------------------------------------------------------

/// A 5s 16:9 1080p text request moves Pending -> Processing -> Completed and
/// leaves a non-empty clip on disk.
#[tokio::test]
async fn text_request_completes_with_asset() {
    let h = Harness::new(
        ScriptedService::succeeding().push_status(Ok(OperationStatus::in_flight(Some(50)))),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "A cat walks", hd_config(), &RunContext::default())
        .await;

    assert_eq!(outcome.status, JobStatus::Completed);
    assert!(outcome.is_completed());
    let path = outcome.asset_path.clone().unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
    assert!(path.to_string_lossy().ends_with("_A_cat_walks.mp4"));

    let job_id = outcome.job_id.unwrap();
    assert_eq!(
        h.store.status_history(job_id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
    );
    let record = h.store.get_job(job_id).await.unwrap();
    assert_eq!(record.progress, 100);
    assert_eq!(record.kind, "text_to_video");
    assert_eq!(record.operation_id.as_deref(), Some("operations/op-1"));
    assert_eq!(h.service.submits(), 1);
    assert_eq!(h.service.status_checks(), 2);
}

/// Progress starts at 0, passes through 10/poll/90 and ends at exactly 100
/// without ever going backwards.
#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let h = Harness::new(
        ScriptedService::succeeding()
            .push_status(Ok(OperationStatus::in_flight(Some(40))))
            .push_status(Ok(OperationStatus::in_flight(Some(10))))
            .push_status(Ok(OperationStatus::in_flight(None))),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );
    let (sink, mut rx) = ChannelProgress::new();
    let ctx = RunContext::default().with_progress(Arc::new(sink));

    let outcome = h.text().generate("m1", "Waves", hd_config(), &ctx).await;
    assert!(outcome.is_completed());

    let mut seen = Vec::new();
    while let Ok(update) = rx.try_recv() {
        seen.push(update.percent);
    }
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.contains(&10));
    assert!(seen.contains(&44));
    assert!(seen.contains(&90));
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert!(seen
        .iter()
        .filter(|p| **p > 10 && **p < 90)
        .all(|p| (20..=80).contains(p)));
}

/// Lifecycle events reach the bus in order.
#[tokio::test]
async fn lifecycle_events_published() {
    let h = Harness::new(ScriptedService::succeeding(), FakeDownloader::ok(), FakeToolkit::new());
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let engine = GenerationEngine::new(
        h.service.clone(),
        h.downloader.clone(),
        h.store.clone(),
        common::fast_config(&h.path("videos")),
    )
    .with_events(bus.clone());
    let text = vidchain_pipeline::TextGenerator::new(Arc::new(engine));

    let outcome = text
        .generate("m1", "Sunrise", hd_config(), &RunContext::default())
        .await;
    assert!(outcome.is_completed());

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type);
    }
    assert_eq!(types.first().copied(), Some(event_types::JOB_SUBMITTED));
    assert_eq!(types.last().copied(), Some(event_types::JOB_COMPLETED));
    assert!(types.contains(&event_types::JOB_PROGRESS));
}

// ---------------------------------------------------------------------------
// Test: validation
// ---------------------------------------------------------------------------

/// A 2001-character prompt fails validation before any store or service
/// call.
#[tokio::test]
async fn overlong_prompt_rejected_before_any_call() {
    let h = Harness::new(ScriptedService::succeeding(), FakeDownloader::ok(), FakeToolkit::new());
    let prompt = "a".repeat(2001);

    let outcome = h
        .text()
        .generate("m1", &prompt, hd_config(), &RunContext::default())
        .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.job_id, None);
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::Validation);
    assert!(failure.message.contains("2001"));
    assert_eq!(h.service.submits(), 0);
    assert_eq!(h.store.job_count(), 0);
}

#[tokio::test]
async fn blank_prompt_rejected() {
    let h = Harness::new(ScriptedService::succeeding(), FakeDownloader::ok(), FakeToolkit::new());
    let outcome = h
        .text()
        .generate("m1", "   ", hd_config(), &RunContext::default())
        .await;
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::Validation);
    assert_eq!(h.service.submits(), 0);
}

// ---------------------------------------------------------------------------
// Test: retries
// ---------------------------------------------------------------------------

/// A transient submit failure is retried exactly three times, then the job
/// fails as a network error.
#[tokio::test]
async fn transient_submit_failure_retried_three_times() {
    let mut service = ScriptedService::succeeding();
    for _ in 0..4 {
        service = service.push_submit(Err(ServiceError::Transient("connection reset".into())));
    }
    let h = Harness::new(service, FakeDownloader::ok(), FakeToolkit::new());

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert_eq!(h.service.submits(), 4);
    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::TransientNetwork);
    let job_id = outcome.job_id.unwrap();
    assert_eq!(
        h.store.status_history(job_id),
        vec![JobStatus::Pending, JobStatus::Failed]
    );
}

#[tokio::test]
async fn transient_submit_failure_recovers() {
    let h = Harness::new(
        ScriptedService::succeeding()
            .push_submit(Err(ServiceError::Transient("503".into())))
            .push_submit(Err(ServiceError::Transient("503".into()))),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(h.service.submits(), 3);
}

/// Quota errors surface immediately.
#[tokio::test]
async fn quota_error_not_retried() {
    let h = Harness::new(
        ScriptedService::succeeding().push_submit(Err(ServiceError::Quota(
            "Resource exhausted".into(),
        ))),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert_eq!(h.service.submits(), 1);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::QuotaExceeded);
}

// ---------------------------------------------------------------------------
// Test: polling outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn external_quota_failure_classified() {
    let h = Harness::new(
        ScriptedService::succeeding().push_status(Ok(OperationStatus::failed(
            None,
            "Quota exceeded for project",
        ))),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::QuotaExceeded);
    assert_eq!(
        h.store.status_history(outcome.job_id.unwrap()),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
    );
}

#[tokio::test]
async fn external_generation_failure_classified() {
    let h = Harness::new(
        ScriptedService::succeeding().push_status(Ok(OperationStatus::failed(
            Some(3),
            "Prompt blocked by safety filter",
        ))),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::GenerationFailed);
    assert!(failure.message.contains("safety filter"));
}

/// An operation that never finishes times out after the configured number
/// of status checks.
#[tokio::test]
async fn poll_budget_exhaustion_times_out() {
    let h = Harness::new(ScriptedService::in_flight(), FakeDownloader::ok(), FakeToolkit::new());

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert_eq!(outcome.status, JobStatus::TimedOut);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::Timeout);
    assert_eq!(h.service.status_checks(), 5);
    assert_eq!(h.downloader.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

/// Transient status errors use up attempts but do not abort polling.
#[tokio::test]
async fn transient_status_errors_consume_attempts() {
    let h = Harness::new(
        ScriptedService::succeeding()
            .push_status(Err(ServiceError::Transient("timeout".into())))
            .push_status(Err(ServiceError::Transient("timeout".into()))),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(h.service.status_checks(), 3);
}

#[tokio::test]
async fn success_without_result_url_fails() {
    let mut done = OperationStatus::succeeded("");
    done.result_url = None;
    let h = Harness::new(
        ScriptedService::succeeding().push_status(Ok(done)),
        FakeDownloader::ok(),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::GenerationFailed);
}

/// Only one poll loop may run for a job at a time.
#[tokio::test]
async fn second_poll_loop_for_same_job_rejected() {
    let h = Harness::new(ScriptedService::in_flight(), FakeDownloader::ok(), FakeToolkit::new());
    let request =
        vidchain_core::request::GenerationRequest::text("m1", "Rain", hd_config()).unwrap();
    let payload = vidchain_core::request::SubmitPayload::from_request(&request, Vec::new()).unwrap();
    let ctx = RunContext::default();
    let job = h.engine.submit(&request, &payload, &ctx).await.unwrap();

    let cancel = CancellationToken::new();
    let (first_sink, second_sink) = (NoProgress, NoProgress);
    let mut first = ProgressReporter::new(&first_sink);
    let mut second = ProgressReporter::new(&second_sink);

    let (a, b) = tokio::join!(
        h.engine.poll_until_terminal(&job, &mut first, &cancel),
        h.engine.poll_until_terminal(&job, &mut second, &cancel),
    );

    assert_matches!(a, Err(GenerationError::Timeout { attempts: 5 }));
    assert_matches!(b, Err(GenerationError::AlreadyPolling(id)) if id == job.job_id);
}

// ---------------------------------------------------------------------------
// Test: downloads
// ---------------------------------------------------------------------------

/// A failed download leaves no partial file behind.
#[tokio::test]
async fn failed_download_removes_partial_file() {
    let h = Harness::new(
        ScriptedService::succeeding(),
        FakeDownloader::new(DownloadMode::FailPartway),
        FakeToolkit::new(),
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::Download);
    assert!(files_in(&h.path("videos")).is_empty());
}

#[tokio::test]
async fn stalled_download_times_out() {
    let h = Harness::with_config(
        ScriptedService::succeeding(),
        FakeDownloader::new(DownloadMode::Hang),
        FakeToolkit::new(),
        |mut c| {
            c.download_timeout = Duration::from_millis(30);
            c
        },
    );

    let outcome = h
        .text()
        .generate("m1", "Rain", hd_config(), &RunContext::default())
        .await;

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::Download);
    assert!(failure.message.contains("timed out"));
    assert!(files_in(&h.path("videos")).is_empty());
}

// ---------------------------------------------------------------------------
// Test: cancellation
// ---------------------------------------------------------------------------

/// Cancelling mid-poll stops polling, asks the service to cancel and
/// records `Cancelled`.
#[tokio::test]
async fn cancel_during_poll_marks_job_cancelled() {
    let h = Harness::with_config(
        ScriptedService::in_flight(),
        FakeDownloader::ok(),
        FakeToolkit::new(),
        |mut c| {
            c.max_poll_attempts = 10_000;
            c
        },
    );
    let cancel = CancellationToken::new();
    let ctx = RunContext::default().with_cancel(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let outcome = h.text().generate("m1", "Rain", hd_config(), &ctx).await;

    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::Cancelled);
    assert_eq!(h.service.cancels(), 1);
    assert_eq!(
        h.store.status_history(outcome.job_id.unwrap()).last(),
        Some(&JobStatus::Cancelled)
    );
}
