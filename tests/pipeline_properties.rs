use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;

use motionwatch::config::PipelineConfig;
use motionwatch::detect::build_background_model;
use motionwatch::ingest::{MemorySource, SyntheticScene, SyntheticSource};
use motionwatch::{
    run_streaming, Activity, BlobExtractor, Frame, FrameResult, FrameSource, Pipeline,
    PipelineError, SourceStats, StopHandle, TrackState,
};

fn run_scene(name: &str) -> (Vec<FrameResult>, motionwatch::RunSummary) {
    let scene = SyntheticScene::named(name).expect("built-in scene");
    run(SyntheticSource::new(scene))
}

fn run(mut source: impl FrameSource) -> (Vec<FrameResult>, motionwatch::RunSummary) {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).expect("default config");
    pipeline.run(&mut source).expect("run");
    pipeline.finish()
}

fn final_label(results: &[FrameResult], track_id: u64) -> Option<Activity> {
    results
        .last()?
        .tracks
        .iter()
        .find(|t| t.id == track_id)?
        .label
        .as_ref()
        .map(|l| l.activity)
}

/// Yields `good` frames of the walker scene, then fails to decode.
struct TruncatedSource {
    inner: SyntheticSource,
    good: u64,
    produced: u64,
}

impl FrameSource for TruncatedSource {
    fn name(&self) -> &str {
        "truncated"
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.produced == self.good {
            return Err(PipelineError::Decode {
                frame_index: Some(self.produced),
                reason: "corrupt packet".to_string(),
            }
            .into());
        }
        self.produced += 1;
        self.inner.next_frame()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_produced: self.produced,
            location: "truncated".to_string(),
        }
    }
}

fn truncated(good: u64) -> TruncatedSource {
    TruncatedSource {
        inner: SyntheticSource::new(SyntheticScene::named("walker").expect("walker")),
        good,
        produced: 0,
    }
}

#[test]
fn walker_is_one_confirmed_track_from_first_appearance() {
    let scene = SyntheticScene::named("walker").expect("walker");
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let summary = pipeline.run(&mut SyntheticSource::new(scene)).unwrap();

    assert_eq!(summary.frames_processed, 70);
    assert_eq!(summary.tracks_created, 1);
    assert_eq!(summary.tracks_confirmed, 1);
    assert!(summary.aborted.is_none());

    let track = &pipeline.tracker().tracks()[0];
    assert_eq!(track.id(), 1);
    assert_eq!(track.state(), TrackState::Confirmed);
    assert_eq!(track.first_frame(), 10);
    assert_eq!(track.last_frame(), 69);
    assert!(track.history().iter().all(|entry| entry.observed));
}

#[test]
fn walker_walks_and_runner_runs() {
    let (results, summary) = run_scene("walker");
    assert_eq!(final_label(&results, 1), Some(Activity::Walking));
    let report = &results.last().unwrap().tracks[0];
    assert!((report.velocity.0 - 2.0).abs() < 0.5, "vx {}", report.velocity.0);
    assert!(report.velocity.1.abs() < 0.5);
    assert!(summary.labels.walking > 0);
    assert_eq!(summary.labels.running, 0);

    let (results, summary) = run_scene("runner");
    assert_eq!(final_label(&results, 1), Some(Activity::Running));
    assert_eq!(summary.labels.walking, 0);
}

#[test]
fn stationary_object_ends_standing() {
    let scene = SyntheticScene::named("idle").expect("idle").with_frames(50);
    let (results, _) = run(SyntheticSource::new(scene));
    let label = results
        .last()
        .and_then(|r| r.tracks.first())
        .and_then(|t| t.label.clone())
        .expect("idle track is labelled");
    assert_eq!(label.activity, Activity::Standing);
    assert!(label.confidence > 0.9, "confidence {}", label.confidence);
    assert!(label.mean_speed < 0.5);
}

#[test]
fn empty_scene_has_no_tracks() {
    let (results, summary) = run_scene("empty");
    assert_eq!(summary.total_detections, 0);
    assert_eq!(summary.tracks_created, 0);
    assert!(results.iter().all(|r| r.tracks.is_empty()));
}

#[test]
fn crossing_objects_never_merge() {
    let (results, summary) = run_scene("crossing");
    assert_eq!(summary.tracks_created, 2);
    assert_eq!(summary.peak_tracks, 2);
    for result in results.iter().filter(|r| r.frame_index >= 10) {
        assert_eq!(result.detection_count, 2, "frame {}", result.frame_index);
        let ids: Vec<u64> = result.tracks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2], "frame {}", result.frame_index);
    }
    // Track 1 is the upper object throughout.
    for result in &results {
        if let Some(upper) = result.tracks.iter().find(|t| t.id == 1) {
            assert!(upper.centroid.1 < 60.0);
        }
    }
}

#[test]
fn same_input_gives_same_digest() {
    let (_, first) = run_scene("crossing");
    let (_, second) = run_scene("crossing");
    assert_eq!(first.digest, second.digest);
    assert_eq!(first, second);

    let (_, other) = run_scene("walker");
    assert_ne!(first.digest, other.digest);
}

#[test]
fn track_ids_strictly_increase_and_are_never_reused() {
    let scene = SyntheticScene::new(160, 120, 80)
        .with_object(
            motionwatch::ingest::SceneObject::moving(10.0, 20.0, 2.0, 0.0, 10, 20)
                .starting_at(10)
                .ending_at(30),
        )
        .with_object(
            motionwatch::ingest::SceneObject::moving(10.0, 80.0, 2.0, 0.0, 10, 20)
                .starting_at(45),
        );
    let (results, summary) = run(SyntheticSource::new(scene));

    let mut seen = BTreeSet::new();
    let mut highest = 0;
    for result in &results {
        let ids: Vec<u64> = result.tracks.iter().map(|t| t.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids ordered");
        for id in ids {
            if seen.insert(id) {
                assert!(id > highest, "new id {} after {}", id, highest);
                highest = id;
            }
        }
    }
    assert_eq!(summary.tracks_created, 2);
    assert_eq!(summary.tracks_terminated, 1);
    assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn accepted_detections_are_a_subset_of_candidates() {
    let config = PipelineConfig::default();
    let mut background = build_background_model(&config.background);
    let blobs = BlobExtractor::new(
        config.min_blob_area,
        config.detection_threshold,
        config.blob.morphology_radius,
    );
    let mut source = SyntheticSource::new(SyntheticScene::named("crossing").unwrap());
    while let Some(frame) = source.next_frame().unwrap() {
        let mask = background.update(&frame).unwrap();
        let accepted = blobs.extract(&mask);
        let candidates = blobs.candidates(&mask);
        assert!(accepted.len() <= candidates.len());
        assert!(accepted.iter().all(|d| candidates.contains(d)));
        assert!(accepted
            .iter()
            .all(|d| d.confidence >= config.detection_threshold && d.area >= config.min_blob_area));
    }
}

#[test]
fn decode_failure_keeps_earlier_results() {
    let (results, summary) = run(truncated(25));
    assert_eq!(results.len(), 25);
    assert_eq!(summary.frames_processed, 25);
    let reason = summary.aborted.expect("run aborted");
    assert!(reason.contains("corrupt packet"));
    assert_eq!(results.last().map(|r| r.frame_index), Some(24));
}

#[test]
fn streaming_decode_failure_delivers_frames_before_it() {
    let mut delivered = Vec::new();
    let summary = run_streaming(
        truncated(20),
        PipelineConfig::default(),
        StopHandle::new(),
        |result| {
            delivered.push(result.frame_index);
            Ok(())
        },
    )
    .unwrap();
    assert_eq!(delivered, (0..20).collect::<Vec<u64>>());
    assert!(summary.aborted.is_some());
}

#[test]
fn frame_with_wrong_size_is_skipped() {
    let mut source = SyntheticSource::new(SyntheticScene::named("walker").unwrap().with_frames(30));
    let mut frames = Vec::new();
    while let Some(frame) = source.next_frame().unwrap() {
        frames.push(frame);
    }
    frames[20] = Frame::new(20, Duration::from_millis(800), 32, 32, 1, vec![0u8; 32 * 32]).unwrap();

    let (results, summary) = run(MemorySource::new("resized", frames));
    assert_eq!(summary.frames_processed, 29);
    assert_eq!(summary.frames_skipped, 1);
    assert!(summary.aborted.is_none());
    assert!(results.iter().all(|r| r.frame_index != 20));
    assert_eq!(summary.tracks_created, 1);
    let last = results.last().unwrap();
    assert_eq!(last.tracks.len(), 1);
    assert_eq!(last.tracks[0].id, 1);
}

#[test]
fn frame_limit_stops_the_run() {
    let mut config = PipelineConfig::default();
    config.ingest.max_frames = 12;
    let mut pipeline = Pipeline::new(config).unwrap();
    let summary = pipeline
        .run(&mut SyntheticSource::new(SyntheticScene::named("walker").unwrap()))
        .unwrap();
    assert_eq!(summary.frames_processed, 12);
    assert!(summary.aborted.is_none());
}
