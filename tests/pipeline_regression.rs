//! Pipeline regression tests
//!
//! Synthetic sessions from the lap simulator are pushed through the stream
//! context and the coaching coordinator end to end. Assertions are kept
//! loose where timing noise matters and strict where behavior is structural.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use apex_coach::coaching::contains_numeric_units;
use apex_coach::config::CoachConfig;
use apex_coach::observability::TracingObserver;
use apex_coach::pipeline::{CoachingCoordinator, ProcessingLoop, ReplaySource, StreamContext};
use apex_coach::safety::SafetyRuleTable;
use apex_coach::simulation::{LapSimulator, SimulationParams};
use apex_coach::storage::{ActionSink, InMemoryActionStore, InMemoryReferenceStore, SledActionStore};
use apex_coach::types::{
    AmpelColor, CarInputs, CornerAnalysisSession, LapContext, SessionContext, TelemetrySample, TurnPhase,
};

// ============================================================================
// Helpers
// ============================================================================

fn params(seed: u64) -> SimulationParams {
    SimulationParams {
        seed: Some(seed),
        laps: 4,
        slow_corner: Some((3, 0.2)),
        ..Default::default()
    }
}

fn references_for(simulator: &LapSimulator) -> InMemoryReferenceStore {
    let store = InMemoryReferenceStore::new();
    for reference in simulator.reference_corners() {
        store
            .insert(simulator.params().track_id, reference)
            .expect("in-memory insert");
    }
    store
}

struct Run {
    sessions: Vec<CornerAnalysisSession>,
    context: StreamContext,
    sink: Arc<InMemoryActionStore>,
}

/// Drive a whole simulated session synchronously through context and coordinator.
fn run_session(params: SimulationParams, config: &CoachConfig) -> Run {
    let mut simulator = LapSimulator::new(params).expect("valid simulation params");
    let sink = Arc::new(InMemoryActionStore::new());
    let mut coordinator = CoachingCoordinator::new(
        Arc::new(references_for(&simulator)),
        sink.clone(),
        Arc::new(TracingObserver::new()),
    );
    let mut context = StreamContext::new(config);

    let mut sessions = Vec::new();
    for sample in simulator.generate_session() {
        if let Some(request) = context.ingest(&sample) {
            sessions.push(coordinator.analyze_lap_with(config, &request));
        }
    }
    Run { sessions, context, sink }
}

fn assert_actions_permitted(session: &CornerAnalysisSession) {
    let rules = SafetyRuleTable::new();
    for action in &session.selected_actions {
        assert!(
            rules.is_allowed(action.phase, action.safety_ampel_color, action.action_type, action.intensity),
            "lap {}: {} {} not permitted under {}",
            session.lap_number,
            action.action_type,
            action.intensity,
            action.safety_ampel_color
        );
    }
}

/// Hand-built 60 Hz player samples for a single time-trial stream.
struct SampleClock {
    frame: u32,
}

impl SampleClock {
    const HZ: f64 = 60.0;

    fn sample(&mut self, lap: u16, brake: f64, throttle: f64, speed: f64) -> TelemetrySample {
        self.frame += 1;
        let t = f64::from(self.frame) / Self::HZ;
        TelemetrySample {
            timestamp: t,
            car_index: 0,
            player_car_index: 0,
            session: SessionContext {
                session_uid: 77,
                track_id: 3,
                session_type: 12,
                is_time_trial: true,
                session_time: t,
            },
            lap: LapContext {
                lap_number: lap,
                lap_distance: 0.0,
                current_lap_time_ms: (t * 1000.0).round() as u32,
                is_valid: true,
            },
            inputs: CarInputs {
                speed_kmh: speed,
                throttle,
                brake,
                ..Default::default()
            },
            slip: None,
        }
    }
}

// ============================================================================
// Segmentation through the stream context
// ============================================================================

#[test]
fn progressive_throttle_exit_completes_one_corner() {
    let config = CoachConfig::default();
    let mut context = StreamContext::new(&config);
    let mut clock = SampleClock { frame: 0 };
    let mut requests = Vec::new();
    let mut feed = |sample: TelemetrySample| {
        if let Some(request) = context.ingest(&sample) {
            requests.push(request);
        }
    };

    for _ in 0..30 {
        feed(clock.sample(1, 0.0, 1.0, 250.0));
    }
    for i in 0..60 {
        feed(clock.sample(1, 0.8, 0.0, 250.0 - 2.0 * f64::from(i)));
    }
    for _ in 0..20 {
        feed(clock.sample(1, 0.0, 0.0, 130.0));
    }
    // +0.05 per frame, never a single large step
    let mut throttle: f64 = 0.0;
    for i in 0..20 {
        throttle = (throttle + 0.05).min(1.0);
        feed(clock.sample(1, 0.0, throttle, 130.0 + f64::from(i)));
    }
    for _ in 0..30 {
        feed(clock.sample(1, 0.0, 1.0, 150.0));
    }
    feed(clock.sample(2, 0.0, 1.0, 150.0));
    drop(feed);

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].segments.len(), 1);
    assert!(requests[0].segments[0].exit_ms.is_some());
    assert_eq!(context.lap_stats().segments_completed, 1);
    assert_eq!(context.segmenter().stats().abandoned, 0);
}

// ============================================================================
// Ranking and selection
// ============================================================================

#[test]
fn slow_corner_ranks_first_and_is_coached() {
    let run = run_session(params(11), &CoachConfig::default());
    assert_eq!(run.sessions.len(), 4);

    let last = run.sessions.last().expect("at least one lap analysed");
    assert_eq!(last.corner_impacts[0].corner_id, 3);
    assert!(last.corner_impacts[0].delta_ms > 0.0);
    assert!(last.selected_corners.contains(&3));
    assert!(last.selected_actions.iter().any(|a| a.corner_id == 3));
    assert!(last.total_expected_gain_ms() >= 0.0);
}

#[test]
fn impacts_are_sorted_and_selection_is_capped() {
    let config = CoachConfig::default();
    let run = run_session(params(5), &config);
    for session in &run.sessions {
        let impacts: Vec<f64> = session.corner_impacts.iter().map(|i| i.normalized_impact).collect();
        assert!(impacts.windows(2).all(|w| w[0] >= w[1]), "{impacts:?}");
        assert!(session.corner_impacts.len() <= config.ranking.max_ranked_corners);
        assert!(session.selected_corners.len() <= config.ranking.max_coaching_corners);
        assert!(session.selected_actions.len() <= config.resolver.max_corners_per_lap);
    }
}

#[test]
fn per_lap_cap_of_one_keeps_a_single_action() {
    let mut config = CoachConfig::default();
    config.resolver.max_corners_per_lap = 1;
    let run = run_session(params(11), &config);
    for session in &run.sessions {
        assert!(session.selected_actions.len() <= 1);
    }
    let last = run.sessions.last().expect("laps analysed");
    assert_eq!(last.selected_actions.len(), 1);
}

#[test]
fn one_action_per_corner_and_no_numeric_text() {
    let run = run_session(params(23), &CoachConfig::default());
    for session in &run.sessions {
        let mut corners: Vec<u32> = session.selected_actions.iter().map(|a| a.corner_id).collect();
        corners.sort_unstable();
        corners.dedup();
        assert_eq!(corners.len(), session.selected_actions.len());
        for action in &session.selected_actions {
            assert!(!action.user_text.is_empty());
            assert!(!contains_numeric_units(&action.user_text), "{}", action.user_text);
            if let Some(hint) = &action.focus_hint {
                assert!(!contains_numeric_units(hint), "{hint}");
            }
        }
        assert_actions_permitted(session);
    }
}

// ============================================================================
// Safety
// ============================================================================

#[test]
fn high_slip_turns_ampels_and_softens_rotation_coaching() {
    let high = SimulationParams {
        slip_level: 1.0,
        ..params(11)
    };
    let run = run_session(high, &CoachConfig::default());
    let last = run.sessions.last().expect("laps analysed");

    let dist = &last.safety_report.ampel_distribution;
    let non_green = dist.get(&AmpelColor::Yellow).copied().unwrap_or(0) + dist.get(&AmpelColor::Red).copied().unwrap_or(0);
    assert!(non_green > 0, "{dist:?}");

    let rotation: Vec<_> = run
        .sessions
        .iter()
        .flat_map(|s| s.generated_candidates.iter())
        .filter(|c| c.phase == TurnPhase::Rotation)
        .collect();
    assert!(!rotation.is_empty());
    assert!(rotation.iter().all(|c| c.intensity.is_gentle() && !c.safety_constraints.is_empty()));

    for session in &run.sessions {
        assert_actions_permitted(session);
        let report = &session.safety_report;
        assert!(report.passed_candidates <= report.total_candidates);
        assert_eq!(report.blocked_by_color.values().sum::<usize>(), report.blocked_candidates);
    }
}

#[test]
fn low_slip_stays_green() {
    let low = SimulationParams {
        slip_level: 0.1,
        ..params(11)
    };
    let run = run_session(low, &CoachConfig::default());
    for session in &run.sessions {
        let dist = &session.safety_report.ampel_distribution;
        assert_eq!(dist.get(&AmpelColor::Red).copied().unwrap_or(0), 0, "{dist:?}");
        assert_eq!(session.safety_report.blocked_candidates, 0);
    }
}

// ============================================================================
// Lap handling and persistence
// ============================================================================

#[test]
fn invalid_laps_are_discarded() {
    let with_invalid = SimulationParams {
        invalid_laps: vec![2],
        ..params(11)
    };
    let run = run_session(with_invalid, &CoachConfig::default());
    let laps: Vec<u16> = run.sessions.iter().map(|s| s.lap_number).collect();
    assert_eq!(laps, vec![1, 3, 4]);

    let stats = run.context.lap_stats();
    assert_eq!(stats.laps_completed, 3);
    assert_eq!(stats.laps_discarded, 1);
}

#[test]
fn every_selected_action_is_persisted() {
    let run = run_session(params(11), &CoachConfig::default());
    let selected: usize = run.sessions.iter().map(|s| s.selected_actions.len()).sum();
    assert_eq!(run.sink.action_count(), selected);

    let corner3 = run.sink.actions_for_corner(3, 10).expect("in-memory query");
    assert!(!corner3.is_empty());
    assert!(corner3.windows(2).all(|w| w[0].generated_at >= w[1].generated_at));
}

#[test]
fn processing_loop_persists_to_sled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SledActionStore::open(dir.path().join("actions")).expect("open sled"));

    let stats = tokio_test::block_on(async {
        let mut simulator = LapSimulator::new(params(11)).expect("valid params");
        let references = references_for(&simulator);
        let mut source = ReplaySource::new(simulator.generate_session(), 0);
        let coordinator = CoachingCoordinator::new(
            Arc::new(references),
            store.clone(),
            Arc::new(TracingObserver::new()),
        );
        ProcessingLoop::new(coordinator, (), CancellationToken::new())
            .with_config(Arc::new(CoachConfig::default()))
            .run(&mut source)
            .await
    });

    assert_eq!(stats.coordinator.laps_analyzed, 4);
    assert_eq!(stats.coordinator.persistence_failures, 0);
    assert_eq!(store.action_count() as u64, stats.coordinator.actions_selected);
    assert!(stats.coordinator.actions_selected > 0);
}
