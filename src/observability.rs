//! Observability sink for coaching decisions
//!
//! The coordinator reports every analysed lap to a `CoachingObserver`. The
//! default `TracingObserver` emits structured tracing records and keeps an
//! in-process `CoachingMetrics` collector.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{ActionType, AmpelColor, CornerAnalysisSession, SafetyReport, SelectedAction};

pub trait CoachingObserver: Send + Sync {
    /// One selected action of an analysed lap.
    fn on_recommendation(&self, session: &CornerAnalysisSession, action: &SelectedAction);

    fn on_safety_report(&self, session: &CornerAnalysisSession, report: &SafetyReport);

    /// Whole-lap summary, called once after the per-action callbacks.
    fn on_analysis_complete(&self, session: &CornerAnalysisSession, budget_exceeded: bool);
}

/// Point-in-time copy of the collected metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub laps_analyzed: u64,
    pub candidates_generated: u64,
    pub candidates_blocked: u64,
    pub actions_selected: u64,
    pub consistency_drills: u64,
    pub budget_exceeded: u64,
    pub total_analysis_ms: f64,
    pub max_analysis_ms: f64,
    pub actions_by_type: BTreeMap<ActionType, u64>,
    pub actions_by_color: BTreeMap<AmpelColor, u64>,
    pub blocked_by_action: BTreeMap<ActionType, u64>,
    pub blocked_by_color: BTreeMap<AmpelColor, u64>,
}

impl MetricsSnapshot {
    pub fn avg_analysis_ms(&self) -> f64 {
        if self.laps_analyzed == 0 {
            0.0
        } else {
            self.total_analysis_ms / self.laps_analyzed as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} laps, {} actions ({} drills), {} of {} candidates blocked, avg {:.2}ms, max {:.2}ms, {} over budget",
            self.laps_analyzed,
            self.actions_selected,
            self.consistency_drills,
            self.candidates_blocked,
            self.candidates_generated,
            self.avg_analysis_ms(),
            self.max_analysis_ms,
            self.budget_exceeded
        )
    }
}

/// In-process metrics collector
#[derive(Debug, Default)]
pub struct CoachingMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl CoachingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session: &CornerAnalysisSession, budget_exceeded: bool) {
        let mut m = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        m.laps_analyzed += 1;
        m.candidates_generated += session.safety_report.total_candidates as u64;
        m.candidates_blocked += session.safety_report.blocked_candidates as u64;
        m.actions_selected += session.selected_actions.len() as u64;
        m.consistency_drills += session.consistency_drills().len() as u64;
        if budget_exceeded {
            m.budget_exceeded += 1;
        }
        m.total_analysis_ms += session.analysis_duration_ms;
        m.max_analysis_ms = m.max_analysis_ms.max(session.analysis_duration_ms);
        for action in &session.selected_actions {
            *m.actions_by_type.entry(action.action_type).or_insert(0) += 1;
            *m.actions_by_color.entry(action.safety_ampel_color).or_insert(0) += 1;
        }
        let report = &session.safety_report;
        for (&action, &n) in &report.blocked_by_action {
            *m.blocked_by_action.entry(action).or_insert(0) += n as u64;
        }
        for (&color, &n) in &report.blocked_by_color {
            *m.blocked_by_color.entry(color).or_insert(0) += n as u64;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reset(&self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = MetricsSnapshot::default();
    }
}

/// Writes structured tracing records and feeds `CoachingMetrics`.
#[derive(Debug, Default)]
pub struct TracingObserver {
    metrics: CoachingMetrics,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &CoachingMetrics {
        &self.metrics
    }
}

impl CoachingObserver for TracingObserver {
    fn on_recommendation(&self, session: &CornerAnalysisSession, action: &SelectedAction) {
        info!(
            session = session.session_uid,
            lap = session.lap_number,
            corner = action.corner_id,
            phase = %action.phase,
            action = %action.action_type,
            intensity = %action.intensity,
            ampel = %action.safety_ampel_color,
            gain_ms = action.expected_gain_ms,
            confidence = action.confidence,
            "Coaching recommendation: {}",
            action.coaching_message()
        );
    }

    fn on_safety_report(&self, session: &CornerAnalysisSession, report: &SafetyReport) {
        if report.blocked_candidates > 0 {
            info!(
                session = session.session_uid,
                lap = session.lap_number,
                total = report.total_candidates,
                blocked = report.blocked_candidates,
                block_rate = report.block_rate,
                blocked_by_action = ?report.blocked_by_action,
                blocked_by_color = ?report.blocked_by_color,
                "{}",
                report
            );
        } else {
            debug!(session = session.session_uid, lap = session.lap_number, "{}", report);
        }
    }

    fn on_analysis_complete(&self, session: &CornerAnalysisSession, budget_exceeded: bool) {
        self.metrics.record(session, budget_exceeded);
        if budget_exceeded {
            warn!(
                lap = session.lap_number,
                duration_ms = session.analysis_duration_ms,
                "Lap analysis exceeded latency budget"
            );
        }
        debug!(
            lap = session.lap_number,
            corners = session.corner_impacts.len(),
            selected = session.selected_actions.len(),
            gain_ms = session.total_expected_gain_ms(),
            "Lap analysis complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionIntensity, CornerImpact, TurnPhase};
    use chrono::Utc;

    fn session(duration_ms: f64, drills: usize) -> CornerAnalysisSession {
        let impacts = (0..drills)
            .map(|i| CornerImpact {
                corner_id: i as u32 + 1,
                delta_ms: 100.0,
                normalized_impact: 1.0,
                consistency_score: 3.0,
                sample_count: 5,
                reference_median_ms: 1000.0,
                reference_iqr_ms: 100.0,
                needs_consistency_drill: true,
            })
            .collect();
        CornerAnalysisSession {
            session_uid: 7,
            track_id: 1,
            lap_number: 3,
            corner_impacts: impacts,
            selected_corners: Vec::new(),
            generated_candidates: Vec::new(),
            selected_actions: vec![SelectedAction {
                action_id: "id".into(),
                corner_id: 1,
                phase: TurnPhase::Entry,
                action_type: ActionType::BrakeEarlier,
                intensity: ActionIntensity::VerySoft,
                expected_gain_ms: 0.0,
                confidence: 0.9,
                safety_ampel_color: AmpelColor::Yellow,
                generated_at: Utc::now(),
                user_text: "Etwas früher an die Bremse".into(),
                focus_hint: None,
            }],
            safety_report: SafetyReport {
                total_candidates: 4,
                passed_candidates: 3,
                blocked_candidates: 1,
                block_rate: 0.25,
                blocked_by_action: BTreeMap::from([(ActionType::BuildPressureFaster, 1)]),
                blocked_by_color: BTreeMap::from([(AmpelColor::Red, 1)]),
                ..Default::default()
            },
            performance_mode: None,
            analysis_duration_ms: duration_ms,
            analysis_timestamp: Utc::now(),
            assist_filter: "default".into(),
            device_filter: "wheel".into(),
        }
    }

    #[test]
    fn test_metrics_accumulate() {
        let observer = TracingObserver::new();
        observer.on_analysis_complete(&session(10.0, 1), false);
        observer.on_analysis_complete(&session(200.0, 0), true);

        let m = observer.metrics().snapshot();
        assert_eq!(m.laps_analyzed, 2);
        assert_eq!(m.actions_selected, 2);
        assert_eq!(m.candidates_blocked, 2);
        assert_eq!(m.consistency_drills, 1);
        assert_eq!(m.budget_exceeded, 1);
        assert!((m.avg_analysis_ms() - 105.0).abs() < 1e-9);
        assert_eq!(m.max_analysis_ms, 200.0);
        assert_eq!(m.actions_by_color.get(&AmpelColor::Yellow), Some(&2));
        assert_eq!(m.blocked_by_color.get(&AmpelColor::Red), Some(&2));
        assert_eq!(m.blocked_by_action.get(&ActionType::BuildPressureFaster), Some(&2));

        observer.metrics().reset();
        assert_eq!(observer.metrics().snapshot(), MetricsSnapshot::default());
    }
}
