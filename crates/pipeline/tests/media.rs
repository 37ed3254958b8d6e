//! Frame extraction and merging against the fake media toolkit.

mod common;

use assert_matches::assert_matches;
use common::{clip_info, FakeDownloader, FakeToolkit, Harness, ScriptedService};
use vidchain_core::request::OutputConfig;
use vidchain_core::scene::{Project, Scene};
use vidchain_core::status::SceneStatus;
use vidchain_pipeline::{ExtractionError, FrameExtractor, MergeError};

fn harness(toolkit: FakeToolkit) -> Harness {
    Harness::new(ScriptedService::succeeding(), FakeDownloader::ok(), toolkit)
}

fn completed_scene(prompt: &str, clip: &std::path::Path) -> Scene {
    let mut scene = Scene::new(prompt, OutputConfig::default());
    scene.status = SceneStatus::Completed;
    scene.asset_path = Some(clip.to_path_buf());
    scene
}

// ---------------------------------------------------------------------------
// Test: frame extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn last_frame_named_after_label() {
    let h = harness(FakeToolkit::new());
    let clip = h.write_clip("scene1.mp4");

    let frame = h.extractor().extract_last_frame(&clip, "1").await.unwrap();

    assert_eq!(frame, h.path("frames").join("scene_1_last_frame.jpg"));
    assert!(frame.is_file());
    let (_, ts) = h.toolkit.extractions()[0].clone();
    assert!((ts - 4.9).abs() < 1e-9);
}

#[tokio::test]
async fn frame_at_timestamp() {
    let h = harness(FakeToolkit::new());
    let clip = h.write_clip("clip.mp4");

    let frame = h
        .extractor()
        .extract_frame_at(&clip, 2.5, "intro")
        .await
        .unwrap();

    assert_eq!(frame, h.path("frames").join("frame_intro_2.5s.jpg"));
    assert_matches!(
        h.extractor().extract_frame_at(&clip, -1.0, "intro").await,
        Err(ExtractionError::InvalidTimestamp(_))
    );
}

#[tokio::test]
async fn thumbnail_defaults_to_one_second() {
    let h = harness(FakeToolkit::new());
    let clip = h.write_clip("clip.mp4");

    let thumb = h
        .extractor()
        .generate_thumbnail(&clip, None, "clip")
        .await
        .unwrap();

    assert!(thumb.is_file());
    let (_, ts) = h.toolkit.extractions()[0].clone();
    assert_eq!(ts, 1.0);
    let img = image::open(&thumb).unwrap();
    assert!(img.width() <= 320 && img.height() <= 180);
}

#[tokio::test]
async fn missing_source_is_an_extraction_error() {
    let h = harness(FakeToolkit::new());
    let result = h
        .extractor()
        .extract_last_frame(&h.path("nope.mp4"), "1")
        .await;
    assert_matches!(result, Err(ExtractionError::SourceMissing(_)));
}

/// Availability is checked once and cached.
#[tokio::test]
async fn unavailable_tool_checked_once() {
    let h = harness(FakeToolkit::unavailable());
    let clip = h.write_clip("clip.mp4");
    let extractor = FrameExtractor::new(h.toolkit.clone(), h.path("frames"));

    assert!(!extractor.is_available().await);
    assert_matches!(
        extractor.extract_last_frame(&clip, "1").await,
        Err(ExtractionError::Unavailable)
    );
    assert_eq!(
        h.toolkit
            .availability_checks
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

// ---------------------------------------------------------------------------
// Test: compatibility
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_input_is_compatible() {
    let h = harness(FakeToolkit::new());
    let clip = h.write_clip("a.mp4");
    assert!(h.merger().validate_compatible(&[clip]).await);
}

#[tokio::test]
async fn resolution_or_fps_mismatch_is_incompatible() {
    let h = harness(FakeToolkit::new());
    let a = h.write_clip("a.mp4");
    let b = h.write_clip("b.mp4");
    let c = h.write_clip("c.mp4");
    h.toolkit.set_info(&b, clip_info(1920, 1080, 24.0));
    h.toolkit.set_info(&c, clip_info(1280, 720, 30.0));

    let merger = h.merger();
    assert!(!merger.validate_compatible(&[a.clone(), b]).await);
    assert!(!merger.validate_compatible(&[a, c]).await);
}

#[tokio::test]
async fn probe_failure_is_incompatible_not_an_error() {
    let h = harness(FakeToolkit::new());
    let a = h.write_clip("a.mp4");
    assert!(
        !h.merger()
            .validate_compatible(&[a, h.path("missing.mp4")])
            .await
    );
}

// ---------------------------------------------------------------------------
// Test: merging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn merge_concatenates_in_order() {
    let h = harness(FakeToolkit::new());
    let clips = vec![h.write_clip("1.mp4"), h.write_clip("2.mp4"), h.write_clip("3.mp4")];

    let result = h.merger().merge(&clips, None).await.unwrap();

    assert!(result.compatible);
    assert_eq!(result.sources, clips);
    assert!(result.output_path.starts_with(h.path("merged")));
    let name = result.output_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("merged_") && name.ends_with(".mp4"));
    assert!(result.output_path.is_file());
    assert_eq!(h.toolkit.concats(), vec![clips]);
}

#[tokio::test]
async fn merge_rejects_missing_input() {
    let h = harness(FakeToolkit::new());
    let a = h.write_clip("a.mp4");
    let missing = h.path("gone.mp4");

    let result = h.merger().merge(&[a, missing.clone()], None).await;

    assert_matches!(result, Err(MergeError::InputMissing(p)) if p == missing);
    assert!(h.toolkit.concats().is_empty());
}

#[tokio::test]
async fn merge_surfaces_tool_failure() {
    let h = harness(FakeToolkit::failing_concat());
    let clips = vec![h.write_clip("a.mp4"), h.write_clip("b.mp4")];

    let result = h.merger().merge(&clips, Some(h.path("out/final.mp4"))).await;

    assert_matches!(result, Err(MergeError::Tool(_)));
}

#[tokio::test]
async fn merge_with_no_inputs_fails() {
    let h = harness(FakeToolkit::new());
    assert_matches!(h.merger().merge(&[], None).await, Err(MergeError::NoInputs));
}

/// Merging a project with an unfinished scene is refused before the tool
/// runs.
#[tokio::test]
async fn merge_sequence_requires_all_scenes_completed() {
    let h = harness(FakeToolkit::new());
    let clip = h.write_clip("a.mp4");
    let mut project = Project::new("Half done");
    project.add_scene(completed_scene("One", &clip)).unwrap();
    project
        .add_scene(Scene::new("Two", OutputConfig::default()))
        .unwrap();

    let result = h.merger().merge_sequence(&project, None).await;

    assert_matches!(
        result,
        Err(MergeError::ScenesIncomplete { ordinals }) if ordinals == vec![2]
    );
    assert!(h.toolkit.concats().is_empty());
}

#[tokio::test]
async fn merge_sequence_uses_ordinal_order() {
    let h = harness(FakeToolkit::new());
    let first = h.write_clip("first.mp4");
    let second = h.write_clip("second.mp4");
    h.toolkit.set_info(&second, clip_info(1920, 1080, 24.0));

    let mut project = Project::new("Done");
    project.add_scene(completed_scene("One", &second)).unwrap();
    project.add_scene(completed_scene("Two", &first)).unwrap();
    project.move_scene(1, 0).unwrap();

    let result = h
        .merger()
        .merge_sequence(&project, Some(h.path("final.mp4")))
        .await
        .unwrap();

    assert_eq!(result.sources, vec![first, second]);
    assert_eq!(result.output_path, h.path("final.mp4"));
    // Mismatched resolution is reported, not fatal.
    assert!(!result.compatible);
}
