//! Corner segmentation scenarios
//!
//! Drives the marker detector and phase segmenter through their public API
//! with hand-written marker sequences and pedal traces.

use apex_coach::agents::{MarkerDetector, PhaseSegmenter, SegmenterState};
use apex_coach::config::MarkerConfig;
use apex_coach::types::{CarInputs, Marker, MarkerKind, TurnPhase, TurnSegment};

const EPS: f64 = 1e-6;

fn marker(kind: MarkerKind, t: f64, speed: f64) -> Marker {
    Marker::new(kind, t, 0.0, speed)
}

fn inputs(brake: f64, throttle: f64, speed: f64) -> CarInputs {
    CarInputs {
        speed_kmh: speed,
        throttle,
        brake,
        ..Default::default()
    }
}

/// Feed a pedal trace (brake, throttle, speed) at 10 Hz through detector and segmenter.
fn drive(trace: &[(f64, f64, f64)]) -> (Vec<TurnSegment>, PhaseSegmenter) {
    drive_at(trace, 10.0)
}

fn drive_at(trace: &[(f64, f64, f64)], hz: f64) -> (Vec<TurnSegment>, PhaseSegmenter) {
    let mut detector = MarkerDetector::new(&MarkerConfig::default());
    let mut segmenter = PhaseSegmenter::new();
    let mut segments = Vec::new();
    for (i, &(brake, throttle, speed)) in trace.iter().enumerate() {
        let t = (i + 1) as f64 / hz;
        let markers = detector.detect(&inputs(brake, throttle, speed), t);
        if let Some(segment) = segmenter.process(&markers) {
            segments.push(segment);
        }
    }
    (segments, segmenter)
}

/// Cruise, six braking frames, four coasting frames, throttle ramp.
fn corner_trace() -> Vec<(f64, f64, f64)> {
    let mut trace = vec![(0.0, 1.0, 250.0); 4];
    for i in 0..6 {
        trace.push((0.9, 0.0, 240.0 - 20.0 * f64::from(i)));
    }
    for i in 0..4 {
        trace.push((0.0, 0.0, 125.0 + f64::from(i)));
    }
    for (i, throttle) in [0.2, 0.4, 0.6, 0.8, 1.0, 1.0].into_iter().enumerate() {
        trace.push((0.0, throttle, 130.0 + 5.0 * i as f64));
    }
    trace
}

/// 60 Hz corner with a progressive exit: throttle rises 0.05 per frame.
fn smooth_exit_trace() -> Vec<(f64, f64, f64)> {
    let mut trace = vec![(0.0, 1.0, 250.0); 30];
    for i in 0..60 {
        trace.push((0.8, 0.0, 250.0 - 2.0 * f64::from(i)));
    }
    trace.extend(vec![(0.0, 0.0, 130.0); 20]);
    let mut throttle: f64 = 0.0;
    for i in 0..20 {
        throttle = (throttle + 0.05).min(1.0);
        trace.push((0.0, throttle, 130.0 + f64::from(i)));
    }
    trace.extend(vec![(0.0, 1.0, 150.0); 30]);
    trace
}

#[test]
fn smooth_throttle_ramp_completes_the_corner() {
    let (segments, segmenter) = drive_at(&smooth_exit_trace(), 60.0);
    assert_eq!(segments.len(), 1);
    assert_eq!(segmenter.state(), SegmenterState::Idle);
    assert_eq!(segmenter.stats().completed, 1);

    let s = &segments[0];
    assert!(s.markers.throttle_opening.is_some());
    assert!(s.exit_ms.is_some_and(|ms| ms > 0.0));
    assert!(s.markers.exit_speed_kmh.is_some_and(|v| v > 130.0));
}

#[test]
fn smooth_exits_keep_consecutive_corners_apart() {
    let mut trace = smooth_exit_trace();
    trace.extend(smooth_exit_trace());
    let (segments, _) = drive_at(&trace, 60.0);
    assert_eq!(segments.len(), 2);
    assert!(segments[1].start_time > segments[0].end_time);
}

#[test]
fn missing_brake_release_leaves_entry_open() {
    let (t0, t1, t2, t3) = (10.0, 11.2, 12.0, 12.6);
    let mut segmenter = PhaseSegmenter::new();

    assert!(segmenter.process(&[marker(MarkerKind::BrakeStart, t0, 200.0)]).is_none());
    assert_eq!(segmenter.current_phase(), Some(TurnPhase::Entry));
    assert!(segmenter.process(&[marker(MarkerKind::SpeedMinimum, t1, 120.0)]).is_none());
    assert_eq!(segmenter.current_phase(), Some(TurnPhase::Rotation));
    assert!(segmenter.process(&[marker(MarkerKind::ThrottlePickup, t2, 125.0)]).is_none());
    assert_eq!(segmenter.current_phase(), Some(TurnPhase::Exit));

    let segment = segmenter
        .process(&[marker(MarkerKind::ThrottleOpening, t3, 131.0)])
        .expect("opening in Exit completes the corner");

    assert_eq!(segment.entry_ms, None);
    assert!((segment.rotation_ms.unwrap() - (t2 - t1) * 1000.0).abs() < EPS);
    assert!((segment.exit_ms.unwrap() - (t3 - t2) * 1000.0).abs() < EPS);
    assert_eq!(segment.trail_braking_ms, None);
    assert_eq!(segment.start_time, t0);
    assert_eq!(segment.end_time, t3);
    assert_eq!(segment.markers.entry_speed_kmh, Some(200.0));
    assert_eq!(segment.markers.min_speed_kmh, Some(120.0));
    assert_eq!(segment.markers.exit_speed_kmh, Some(131.0));
    assert!(segment.is_partial());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn throttle_before_release_measures_trail_braking() {
    let mut segmenter = PhaseSegmenter::new();
    segmenter.process(&[marker(MarkerKind::BrakeStart, 1.0, 220.0)]);
    segmenter.process(&[marker(MarkerKind::ThrottlePickup, 2.0, 110.0)]);
    segmenter.process(&[marker(MarkerKind::BrakeRelease, 2.3, 112.0)]);
    let segment = segmenter
        .process(&[marker(MarkerKind::ThrottleOpening, 2.8, 120.0)])
        .expect("corner completes");

    assert!((segment.trail_braking_ms.unwrap() - 300.0).abs() < EPS);
    assert!((segment.entry_ms.unwrap() - 1300.0).abs() < EPS);
    // Release came after pickup, so Rotation never started
    assert_eq!(segment.rotation_ms, None);
}

#[test]
fn detector_driven_corner_produces_one_segment() {
    let (segments, segmenter) = drive(&corner_trace());
    assert_eq!(segments.len(), 1);
    assert_eq!(segmenter.state(), SegmenterState::Idle);

    let s = &segments[0];
    // Brake start on frame 5, release frame 13, pickup frame 16, opening frame 17
    assert!((s.start_time - 0.5).abs() < EPS);
    assert!((s.entry_ms.unwrap() - 800.0).abs() < EPS);
    assert!((s.rotation_ms.unwrap() - 300.0).abs() < EPS);
    assert!((s.exit_ms.unwrap() - 100.0).abs() < EPS);
    assert_eq!(s.trail_braking_ms, None);
    assert_eq!(s.markers.min_speed_kmh, Some(125.0));
    assert!(s.markers.brake_release.is_some());
    assert!(!s.is_partial());
}

#[test]
fn consecutive_corners_get_increasing_turn_ids() {
    let mut trace = corner_trace();
    trace.extend(corner_trace());
    let (segments, segmenter) = drive(&trace);
    assert_eq!(segments.len(), 2);
    assert!(segments[1].turn_id > segments[0].turn_id);
    assert!(segments[1].start_time > segments[0].end_time);
    assert_eq!(segmenter.stats().completed, 2);
}

#[test]
fn abandoned_corner_is_not_emitted() {
    let trace = corner_trace();
    let mut detector = MarkerDetector::new(&MarkerConfig::default());
    let mut segmenter = PhaseSegmenter::new();
    let mut emitted = 0;
    for (i, &(b, th, v)) in trace.iter().enumerate() {
        let t = (i + 1) as f64 * 0.1;
        let markers = detector.detect(&inputs(b, th, v), t);
        if segmenter.process(&markers).is_some() {
            emitted += 1;
        }
        // Lap boundary in the middle of the coast
        if i == 11 {
            assert!(segmenter.abandon());
        }
    }
    assert_eq!(emitted, 0);
    assert_eq!(segmenter.stats().abandoned, 1);
    assert_eq!(segmenter.stats().completed, 0);
}

#[test]
fn brief_pedal_noise_never_opens_a_corner() {
    let mut trace = vec![(0.0, 1.0, 250.0); 5];
    trace.push((0.2, 1.0, 250.0));
    trace.extend(vec![(0.0, 1.0, 251.0); 5]);
    let (segments, segmenter) = drive(&trace);
    assert!(segments.is_empty());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}
