//! Coaching Coordinator - per-lap decision sequence
//!
//! Runs once for every finished lap handed over by the stream context:
//!
//! ```text
//! 1. Ampels       per corner and phase from the worst slip seen
//! 2. References   track baselines for the driver profile, quality filtered
//! 3. Ranking      impact in reference-IQR units, drills first
//! 4. Candidates   rule-table-filtered proposals per phase
//! 5. Safety gate  filter, report, conflict resolution, global caps
//! 6. Selection    localized actions, one per coached corner
//! 7. Persistence  actions to the sink, events to the observer
//! ```
//!
//! Every step reads the same config snapshot, so a hot reload never splits a lap.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::context::LapAnalysisRequest;
use crate::coaching::{ActionSelector, CandidateGenerator};
use crate::config::{self, CoachConfig};
use crate::observability::CoachingObserver;
use crate::ranking::{filter_high_quality, CornerRanker};
use crate::safety::{SafetyAmpelService, SafetyGateResolver, SafetyRuleTable};
use crate::statistics::StatisticsService;
use crate::storage::{ActionSink, PersistenceError, ReferenceStore};
use crate::types::{ActionResult, AmpelBoard, CornerAnalysisSession, CornerReference, SelectedAction};

/// Counters over the coordinator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub laps_analyzed: u64,
    pub actions_selected: u64,
    pub reference_failures: u64,
    pub persistence_failures: u64,
    pub validation_failures: u64,
    pub budget_exceeded: u64,
}

impl std::fmt::Display for CoordinatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "laps={} actions={} reference_failures={} persistence_failures={} validation_failures={} over_budget={}",
            self.laps_analyzed,
            self.actions_selected,
            self.reference_failures,
            self.persistence_failures,
            self.validation_failures,
            self.budget_exceeded
        )
    }
}

pub struct CoachingCoordinator {
    references: Arc<dyn ReferenceStore>,
    sink: Arc<dyn ActionSink>,
    observer: Arc<dyn CoachingObserver>,
    /// Shared by candidate generation and the safety gate
    rules: Arc<SafetyRuleTable>,
    stats: CoordinatorStats,
}

impl CoachingCoordinator {
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        sink: Arc<dyn ActionSink>,
        observer: Arc<dyn CoachingObserver>,
    ) -> Self {
        info!(sink = sink.backend_name(), "Coaching coordinator ready");
        Self {
            references,
            sink,
            observer,
            rules: SafetyRuleTable::shared(),
            stats: CoordinatorStats::default(),
        }
    }

    /// Analyse a lap against the current global config snapshot.
    pub fn analyze_lap(&mut self, request: &LapAnalysisRequest) -> CornerAnalysisSession {
        let config = config::get();
        self.analyze_lap_with(&config, request)
    }

    /// Analyse a lap with an explicit config, persisting on the calling thread.
    pub fn analyze_lap_with(&mut self, config: &CoachConfig, request: &LapAnalysisRequest) -> CornerAnalysisSession {
        let session = self.decide(config, request);
        let failures = persist_actions(self.sink.as_ref(), &session.selected_actions);
        self.finish(config, session, failures)
    }

    /// Analyse a lap on an async worker.
    ///
    /// The decision steps run inline; storage writes go to the blocking pool so a
    /// slow disk never stalls the runtime.
    pub async fn analyze_lap_offloaded(
        &mut self,
        config: &CoachConfig,
        request: &LapAnalysisRequest,
    ) -> CornerAnalysisSession {
        let session = self.decide(config, request);
        let sink = Arc::clone(&self.sink);
        let actions = session.selected_actions.clone();
        let attempted = actions.len() as u64;
        let stored = tokio::task::spawn_blocking(move || persist_actions(sink.as_ref(), &actions)).await;
        let failures = match stored {
            Ok(n) => n,
            Err(e) => {
                error!(lap = request.lap_number, error = %e, "Persistence task failed");
                attempted
            }
        };
        self.finish(config, session, failures)
    }

    /// Steps 1 to 6: everything up to, but excluding, persistence.
    fn decide(&mut self, config: &CoachConfig, request: &LapAnalysisRequest) -> CornerAnalysisSession {
        let started = Instant::now();
        let statistics = StatisticsService::new(&config.statistics);

        // 1. Ampels, keyed by corner ordinal
        let mut ampel = SafetyAmpelService::new(&config.ampel, &config.slip);
        let mut board = AmpelBoard::new();
        for segment in request.segments.iter() {
            let analysis = ampel.analyze(&segment.phase_slip);
            if !analysis.is_empty() {
                board.insert(segment.corner_index, analysis);
            }
        }

        // 2. References
        let references = self.load_references(config, request.session.track_id);

        // 3. Ranking
        let ranker = CornerRanker::new(statistics.clone(), &config.ranking);
        let impacts = ranker.rank(&request.corner_times, &references, config.ranking.max_ranked_corners);
        let selected_corners = ranker.select_coaching_corners(&impacts, config.ranking.max_coaching_corners);

        // 4. Candidates
        let generator = CandidateGenerator::new(statistics.clone(), Arc::clone(&self.rules), &config.candidates);
        let candidates = generator.generate(&impacts, &selected_corners, &board);

        // 5. Safety gate
        let resolver = SafetyGateResolver::new(Arc::clone(&self.rules), &config.resolver);
        let filtered = resolver.apply_safety_filter(candidates.clone(), &board);
        let safety_report = resolver.safety_report(&candidates, &filtered.passed, &board);
        let resolved = resolver.resolve_conflicts(filtered.passed);
        let finals = resolver.enforce_global_limits(resolved);

        let validation = resolver.validate_final_selection(&finals);
        if !validation.all_passed() {
            self.stats.validation_failures += 1;
            error!(
                lap = request.lap_number,
                one_per_corner = validation.one_per_corner,
                within_limit = validation.within_corner_limit,
                no_conflicts = validation.no_phase_conflicts,
                "Final selection failed validation"
            );
        }

        // 6. Selection
        let selector = ActionSelector::new(config.language.locale);
        let selected_actions = selector.select_final_actions(&finals, &board);

        let analysis_duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        CornerAnalysisSession {
            session_uid: request.session.session_uid,
            track_id: request.session.track_id,
            lap_number: request.lap_number,
            corner_impacts: impacts,
            selected_corners,
            generated_candidates: candidates,
            selected_actions,
            safety_report,
            performance_mode: statistics.performance_mode(&request.lap_times),
            analysis_duration_ms,
            analysis_timestamp: Utc::now(),
            assist_filter: config.driver.assist_filter.clone(),
            device_filter: config.driver.device_filter.clone(),
        }
    }

    /// Step 7 once the actions are stored: counters and observers.
    fn finish(
        &mut self,
        config: &CoachConfig,
        session: CornerAnalysisSession,
        persistence_failures: u64,
    ) -> CornerAnalysisSession {
        self.stats.persistence_failures += persistence_failures;
        let budget_exceeded = session.analysis_duration_ms > config.performance.latency_budget_ms as f64;
        self.publish(&session, budget_exceeded);
        session
    }

    fn load_references(&mut self, config: &CoachConfig, track_id: i32) -> Vec<CornerReference> {
        let driver = &config.driver;
        let references = match self
            .references
            .get_references(track_id, &driver.assist_filter, &driver.device_filter)
        {
            Ok(refs) => refs,
            Err(e) => {
                self.stats.reference_failures += 1;
                warn!(track = track_id, error = %e, "Reference lookup failed, lap analysed without references");
                return Vec::new();
            }
        };

        let min_quality = config.ranking.min_reference_quality;
        if min_quality <= 0.0 {
            return references;
        }
        let total = references.len();
        let kept = filter_high_quality(&references, min_quality, Utc::now());
        if kept.len() < total {
            debug!(track = track_id, total, kept = kept.len(), min_quality, "Low-quality references dropped");
        }
        kept
    }

    fn publish(&mut self, session: &CornerAnalysisSession, budget_exceeded: bool) {
        self.stats.laps_analyzed += 1;
        self.stats.actions_selected += session.selected_actions.len() as u64;
        if budget_exceeded {
            self.stats.budget_exceeded += 1;
        }

        self.observer.on_safety_report(session, &session.safety_report);
        for action in &session.selected_actions {
            self.observer.on_recommendation(session, action);
        }
        self.observer.on_analysis_complete(session, budget_exceeded);
    }

    /// Record the evaluated outcome of an earlier action.
    pub fn record_result(&self, result: &ActionResult) -> Result<(), PersistenceError> {
        self.sink.save_action_result(result)
    }

    /// Recent actions and success rate for one corner.
    pub fn corner_history(
        &self,
        corner_id: u32,
        limit: usize,
    ) -> Result<(Vec<SelectedAction>, Option<f64>), PersistenceError> {
        let actions = self.sink.actions_for_corner(corner_id, limit)?;
        let success_rate = self.sink.success_rate(corner_id)?;
        Ok((actions, success_rate))
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn rules(&self) -> &Arc<SafetyRuleTable> {
        &self.rules
    }
}

/// Store selected actions, returning how many failed. Failures are logged, never propagated.
fn persist_actions(sink: &dyn ActionSink, actions: &[SelectedAction]) -> u64 {
    let mut failures = 0;
    for action in actions {
        if let Err(e) = sink.save_action(action) {
            failures += 1;
            warn!(
                action_id = %action.action_id,
                backend = sink.backend_name(),
                error = %e,
                "Failed to persist action"
            );
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::TracingObserver;
    use crate::storage::{InMemoryActionStore, InMemoryReferenceStore};
    use crate::types::{
        ActionIntensity, ActionType, AmpelColor, PhaseSlip, SessionContext, SlipMetrics, TurnMarkers, TurnPhase,
        TurnSegment,
    };
    use std::collections::BTreeMap;

    const TRACK: i32 = 5;

    fn reference(corner_id: u32, median: f64, iqr: f64) -> CornerReference {
        CornerReference {
            corner_id,
            median_time_ms: median,
            q1_ms: median - iqr / 2.0,
            q3_ms: median + iqr / 2.0,
            iqr_ms: iqr,
            sample_count: 80,
            last_updated: Utc::now(),
            assist_filter: String::new(),
            device_filter: String::new(),
            preferred_line: None,
        }
    }

    fn segment(corner_index: u32, entry_slip: Option<f64>) -> TurnSegment {
        let mut phase_slip = PhaseSlip::default();
        if let Some(combined) = entry_slip {
            phase_slip.record(
                TurnPhase::Entry,
                SlipMetrics {
                    combined_slip_factor: combined,
                    ..SlipMetrics::default()
                },
            );
        }
        TurnSegment {
            turn_id: u64::from(corner_index),
            lap_number: 3,
            corner_index,
            start_time: 0.0,
            end_time: 10.5,
            phase: TurnPhase::Exit,
            markers: TurnMarkers::default(),
            entry_ms: Some(4000.0),
            rotation_ms: Some(3000.0),
            exit_ms: Some(3500.0),
            trail_braking_ms: None,
            phase_slip,
        }
    }

    fn request(segments: Vec<TurnSegment>) -> LapAnalysisRequest {
        let mut corner_times = BTreeMap::new();
        corner_times.insert(1, vec![10450.0, 10500.0, 10550.0, 10480.0, 10520.0]);
        corner_times.insert(2, vec![9990.0, 10000.0, 10010.0, 10005.0, 9995.0]);
        LapAnalysisRequest {
            session: SessionContext {
                session_uid: 77,
                track_id: TRACK,
                session_type: 12,
                is_time_trial: true,
                session_time: 300.0,
            },
            lap_number: 3,
            segments: segments.into(),
            corner_times,
            lap_times: vec![90_000.0, 90_100.0],
        }
    }

    struct Fixture {
        coordinator: CoachingCoordinator,
        sink: Arc<InMemoryActionStore>,
        observer: Arc<TracingObserver>,
    }

    fn fixture() -> Fixture {
        let references = InMemoryReferenceStore::new();
        references.insert(TRACK, reference(1, 10000.0, 200.0)).unwrap();
        references.insert(TRACK, reference(2, 10000.0, 200.0)).unwrap();
        let sink = Arc::new(InMemoryActionStore::new());
        let observer = Arc::new(TracingObserver::new());
        let coordinator = CoachingCoordinator::new(Arc::new(references), sink.clone(), observer.clone());
        Fixture { coordinator, sink, observer }
    }

    struct FailingReferences;

    impl ReferenceStore for FailingReferences {
        fn get_references(&self, _: i32, _: &str, _: &str) -> Result<Vec<CornerReference>, PersistenceError> {
            Err(PersistenceError::Storage("offline".to_string()))
        }
    }

    #[test]
    fn test_slow_corner_is_coached() {
        let mut f = fixture();
        let session = f
            .coordinator
            .analyze_lap_with(&CoachConfig::default(), &request(vec![segment(1, None), segment(2, None)]));

        assert_eq!(session.corner_impacts[0].corner_id, 1);
        assert!((session.corner_impacts[0].normalized_impact - 2.5).abs() < 1e-9);
        let corner1: Vec<_> = session.selected_actions.iter().filter(|a| a.corner_id == 1).collect();
        assert_eq!(corner1.len(), 1);
        assert_eq!(corner1[0].phase, TurnPhase::Entry);
        assert!(corner1[0].expected_gain_ms > 0.0);
        assert_eq!(session.track_id, TRACK);
        assert_eq!(session.lap_number, 3);
    }

    #[test]
    fn test_actions_persisted_and_observed() {
        let mut f = fixture();
        let session = f
            .coordinator
            .analyze_lap_with(&CoachConfig::default(), &request(vec![segment(1, None)]));

        assert_eq!(f.sink.action_count(), session.selected_actions.len());
        let snapshot = f.observer.metrics().snapshot();
        assert_eq!(snapshot.laps_analyzed, 1);
        assert_eq!(snapshot.actions_selected, session.selected_actions.len() as u64);
        assert_eq!(f.coordinator.stats().laps_analyzed, 1);

        let (history, rate) = f.coordinator.corner_history(1, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(rate, None);
    }

    #[test]
    fn test_red_entry_blocks_aggressive_braking_advice() {
        let mut f = fixture();
        let session = f
            .coordinator
            .analyze_lap_with(&CoachConfig::default(), &request(vec![segment(1, Some(0.95))]));

        let action = session
            .selected_actions
            .iter()
            .find(|a| a.corner_id == 1)
            .unwrap();
        assert_eq!(action.safety_ampel_color, AmpelColor::Red);
        assert_ne!(action.action_type, ActionType::BuildPressureFaster);
        assert!(session
            .generated_candidates
            .iter()
            .all(|c| !(c.corner_id == 1 && c.action_type == ActionType::BuildPressureFaster)));
    }

    #[test]
    fn test_erratic_corner_gets_the_drill_under_any_entry_ampel() {
        for (slip, color) in [(0.7, AmpelColor::Yellow), (0.95, AmpelColor::Red)] {
            let mut f = fixture();
            let mut req = request(vec![segment(1, Some(slip)), segment(2, None)]);
            // Driver IQR 600 against a reference IQR of 200
            req.corner_times
                .insert(1, vec![10000.0, 10900.0, 10300.0, 11100.0, 10600.0]);
            let session = f.coordinator.analyze_lap_with(&CoachConfig::default(), &req);

            assert_eq!(session.selected_corners[0], 1);
            assert_eq!(session.consistency_drills().len(), 1);
            let corner1: Vec<_> = session.generated_candidates.iter().filter(|c| c.corner_id == 1).collect();
            assert_eq!(corner1.len(), 1);

            let action = session
                .selected_actions
                .iter()
                .find(|a| a.corner_id == 1)
                .expect("drill survives the safety gate");
            assert_eq!(action.action_type, ActionType::BrakeEarlier);
            assert_eq!(action.intensity, ActionIntensity::VerySoft);
            assert_eq!(action.phase, TurnPhase::Entry);
            assert_eq!(action.safety_ampel_color, color);
            assert_eq!(session.safety_report.blocked_by_color.get(&color), None);
        }
    }

    struct FailingSink;

    impl ActionSink for FailingSink {
        fn save_action(&self, _: &SelectedAction) -> Result<(), PersistenceError> {
            Err(PersistenceError::Storage("disk full".to_string()))
        }

        fn save_action_result(&self, _: &ActionResult) -> Result<(), PersistenceError> {
            Err(PersistenceError::Storage("disk full".to_string()))
        }

        fn actions_for_corner(&self, _: u32, _: usize) -> Result<Vec<SelectedAction>, PersistenceError> {
            Ok(Vec::new())
        }

        fn success_rate(&self, _: u32) -> Result<Option<f64>, PersistenceError> {
            Ok(None)
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_offloaded_persistence_stores_actions() {
        let mut f = fixture();
        let session = f
            .coordinator
            .analyze_lap_offloaded(&CoachConfig::default(), &request(vec![segment(1, None)]))
            .await;

        assert!(!session.selected_actions.is_empty());
        assert_eq!(f.sink.action_count(), session.selected_actions.len());
        assert_eq!(f.coordinator.stats().persistence_failures, 0);
        assert_eq!(f.observer.metrics().snapshot().laps_analyzed, 1);
    }

    #[tokio::test]
    async fn test_offloaded_persistence_failures_are_counted() {
        let references = InMemoryReferenceStore::new();
        references.insert(TRACK, reference(1, 10000.0, 200.0)).unwrap();
        let mut coordinator =
            CoachingCoordinator::new(Arc::new(references), Arc::new(FailingSink), Arc::new(TracingObserver::new()));
        let session = coordinator
            .analyze_lap_offloaded(&CoachConfig::default(), &request(vec![segment(1, None)]))
            .await;

        // Storage errors never cost the driver the coaching
        assert!(!session.selected_actions.is_empty());
        assert_eq!(
            coordinator.stats().persistence_failures,
            session.selected_actions.len() as u64
        );
        assert_eq!(coordinator.stats().laps_analyzed, 1);
    }

    #[test]
    fn test_analyze_lap_follows_global_config() {
        let mut f = fixture();
        let session = f.coordinator.analyze_lap(&request(vec![segment(1, None)]));
        assert!(session.selected_actions.len() <= config::get().resolver.max_corners_per_lap);
        assert_eq!(f.coordinator.stats().laps_analyzed, 1);
    }

    #[test]
    fn test_one_action_per_corner_within_lap_cap() {
        let mut f = fixture();
        let mut config = CoachConfig::default();
        config.resolver.max_corners_per_lap = 1;
        let session = f.coordinator.analyze_lap_with(&config, &request(vec![]));

        assert_eq!(session.selected_actions.len(), 1);
        assert_eq!(session.selected_actions[0].corner_id, 1);
        assert_eq!(f.coordinator.stats().validation_failures, 0);
    }

    #[test]
    fn test_reference_failure_yields_empty_session() {
        let sink = Arc::new(InMemoryActionStore::new());
        let mut coordinator =
            CoachingCoordinator::new(Arc::new(FailingReferences), sink.clone(), Arc::new(TracingObserver::new()));
        let session = coordinator.analyze_lap_with(&CoachConfig::default(), &request(vec![segment(1, None)]));

        assert!(session.corner_impacts.is_empty());
        assert!(session.selected_actions.is_empty());
        assert_eq!(coordinator.stats().reference_failures, 1);
        assert_eq!(sink.action_count(), 0);
    }

    #[test]
    fn test_quality_filter_drops_stale_references() {
        let references = InMemoryReferenceStore::new();
        let mut stale = reference(1, 10000.0, 200.0);
        stale.sample_count = 2;
        stale.last_updated = Utc::now() - chrono::Duration::days(90);
        references.insert(TRACK, stale).unwrap();
        let mut coordinator = CoachingCoordinator::new(
            Arc::new(references),
            Arc::new(InMemoryActionStore::new()),
            Arc::new(TracingObserver::new()),
        );

        let mut config = CoachConfig::default();
        config.ranking.min_reference_quality = 0.5;
        let session = coordinator.analyze_lap_with(&config, &request(vec![]));
        assert!(session.corner_impacts.is_empty());

        config.ranking.min_reference_quality = 0.0;
        let session = coordinator.analyze_lap_with(&config, &request(vec![]));
        assert_eq!(session.corner_impacts.len(), 1);
    }
}
