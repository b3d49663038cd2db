use motionwatch::track::{Tracker, TrackerParams};
use motionwatch::{BoundingBox, Detection, TrackState};

fn det(frame: u64, cx: f32, cy: f32) -> Detection {
    Detection::new(
        frame,
        BoundingBox::new(cx - 5.0, cy - 10.0, 10.0, 20.0),
        (cx, cy),
        200,
    )
}

fn tracker_with_tolerance(frames: u32) -> Tracker {
    Tracker::new(TrackerParams {
        occlusion_tolerance_frames: frames,
        ..TrackerParams::default()
    })
}

#[test]
fn track_survives_short_occlusion_with_same_identity() {
    let mut tracker = tracker_with_tolerance(5);
    for frame in 0..10u64 {
        tracker.step(&[det(frame, 20.0 + 3.0 * frame as f32, 60.0)], frame);
    }
    assert_eq!(tracker.tracks()[0].state(), TrackState::Confirmed);

    for frame in 10..13u64 {
        let tracks = tracker.step(&[], frame);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].state(), TrackState::Occluded);
        assert_eq!(tracks[0].time_since_update() as u64, frame - 9);
    }

    let tracks = tracker.step(&[det(13, 20.0 + 3.0 * 13.0, 60.0)], 13);
    assert_eq!(tracks.len(), 1);
    let track = &tracks[0];
    assert_eq!(track.id(), 1);
    assert_eq!(track.state(), TrackState::Confirmed);
    assert_eq!(track.time_since_update(), 0);

    let placeholders: Vec<u64> = track
        .history()
        .iter()
        .filter(|entry| !entry.observed)
        .map(|entry| entry.frame_index)
        .collect();
    assert_eq!(placeholders, vec![10, 11, 12]);
    assert_eq!(track.history().len(), 14);
    assert_eq!(tracker.stats().tracks_created, 1);
}

#[test]
fn track_terminates_after_tolerance_and_id_is_not_reused() {
    let mut tracker = tracker_with_tolerance(5);
    for frame in 0..5u64 {
        tracker.step(&[det(frame, 50.0, 50.0)], frame);
    }

    for frame in 5..10u64 {
        let tracks = tracker.step(&[], frame);
        assert_eq!(tracks.len(), 1, "still occluded at frame {}", frame);
    }
    let tracks = tracker.step(&[], 10);
    assert!(tracks.is_empty());

    let ended = tracker.drain_terminated();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].id(), 1);
    assert_eq!(ended[0].state(), TrackState::Terminated);
    assert_eq!(ended[0].last_frame(), 4);
    assert_eq!(tracker.stats().tracks_terminated, 1);

    let tracks = tracker.step(&[det(11, 50.0, 50.0)], 11);
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].id(), 2);
    assert_eq!(tracks[0].state(), TrackState::Tentative);
}

#[test]
fn equidistant_detections_go_to_lowest_index() {
    let mut tracker = tracker_with_tolerance(5);
    for frame in 0..4u64 {
        tracker.step(&[det(frame, 50.0, 50.0)], frame);
    }

    let tracks = tracker.step(&[det(4, 40.0, 50.0), det(4, 60.0, 50.0)], 4);
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].id(), 1);
    assert_eq!(tracks[0].history().back().map(|e| e.centroid), Some((40.0, 50.0)));
    assert_eq!(tracks[1].id(), 2);
    assert_eq!(tracks[1].history().back().map(|e| e.centroid), Some((60.0, 50.0)));
}

#[test]
fn detection_beyond_gate_starts_new_track() {
    let mut tracker = tracker_with_tolerance(5);
    for frame in 0..4u64 {
        tracker.step(&[det(frame, 20.0, 20.0)], frame);
    }
    let tracks = tracker.step(&[det(4, 140.0, 100.0)], 4);
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].state(), TrackState::Occluded);
    assert_eq!(tracks[1].id(), 2);
}

#[test]
fn two_parallel_objects_keep_separate_identities() {
    let mut tracker = Tracker::new(TrackerParams::default());
    for frame in 0..40u64 {
        let x = 10.0 + 2.5 * frame as f32;
        let detections = [det(frame, x, 30.0), det(frame, 190.0 - x, 100.0)];
        tracker.step(&detections, frame);
    }
    let tracks = tracker.tracks();
    assert_eq!(tracks.len(), 2);
    for track in tracks {
        let rows: Vec<f32> = track.history().iter().map(|e| e.centroid.1).collect();
        assert!(rows.windows(2).all(|w| w[0] == w[1]), "track {} switched rows", track.id());
    }
    assert_eq!(tracker.stats().tracks_created, 2);
}
