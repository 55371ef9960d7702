//! Candidate Generator - per-corner coaching proposals gated by the ampel
//!
//! Each phase looks up its proposals for the current color and keeps the
//! first ones the shared rule table permits. Consistency-drill corners get a
//! single gentle braking drill instead of pace work.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::defaults::{CONSISTENCY_DRILL_CONFIDENCE, CONSISTENCY_DRILL_PRIORITY};
use crate::config::CandidateConfig;
use crate::safety::SafetyRuleTable;
use crate::statistics::StatisticsService;
use crate::types::{
    ActionIntensity, ActionType, AmpelBoard, AmpelColor, CoachingCandidate, CornerImpact,
    SafetyConstraint, TurnPhase, TurnSlipAnalysis,
};
use crate::types::{ActionIntensity as I, ActionType as A, SafetyConstraint as C};

/// One row of the proposal table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
    pub action_type: ActionType,
    pub intensity: ActionIntensity,
    /// Share of the phase's base gain this action is expected to realize
    pub gain_factor: f64,
    pub confidence: f64,
    pub constraint: Option<SafetyConstraint>,
}

const fn proposal(
    action_type: ActionType,
    intensity: ActionIntensity,
    gain_factor: f64,
    confidence: f64,
    constraint: Option<SafetyConstraint>,
) -> Proposal {
    Proposal { action_type, intensity, gain_factor, confidence, constraint }
}

const ENTRY_GREEN: &[Proposal] = &[
    proposal(A::BrakeEarlier, I::Progressive, 0.8, 0.9, None),
    proposal(A::BuildPressureFaster, I::Fast, 0.9, 0.8, None),
];
const ENTRY_YELLOW: &[Proposal] = &[
    proposal(A::BrakeEarlier, I::Progressive, 0.7, 0.85, Some(C::YellowAmpelProgressiveOnly)),
    proposal(A::BuildPressureFaster, I::Soft, 0.5, 0.7, Some(C::YellowAmpelSoftOnly)),
];
const ENTRY_RED: &[Proposal] = &[proposal(
    A::BrakeEarlier,
    I::Progressive,
    0.6,
    0.8,
    Some(C::EntrySlipRedBlocksPressureFaster),
)];

const ROTATION_GREEN: &[Proposal] = &[proposal(A::ReleaseEarlier, I::Progressive, 0.7, 0.85, None)];
const ROTATION_YELLOW: &[Proposal] =
    &[proposal(A::ReleaseEarlier, I::Soft, 0.7, 0.75, Some(C::YellowAmpelSoftRelease))];
const ROTATION_RED: &[Proposal] =
    &[proposal(A::ReleaseEarlier, I::VerySoft, 0.7, 0.6, Some(C::RedAmpelVerySoftRelease))];

const EXIT_GREEN: &[Proposal] = &[
    proposal(A::ThrottleEarlierProgressive, I::Progressive, 0.8, 0.85, None),
    proposal(A::ReduceSteeringThenGas, I::Progressive, 0.6, 0.8, None),
];
const EXIT_YELLOW: &[Proposal] = &[
    proposal(A::ThrottleEarlierProgressive, I::VerySoft, 0.6, 0.7, Some(C::YellowAmpelVerySoftThrottle)),
    proposal(A::ReduceSteeringThenGas, I::Soft, 0.5, 0.75, Some(C::YellowAmpelSoftSteering)),
];
const EXIT_RED: &[Proposal] = &[proposal(
    A::ReduceSteeringThenGas,
    I::Progressive,
    0.5,
    0.8,
    Some(C::ExitSlipRedBlocksEarlyThrottle),
)];

/// Proposals for a phase under a color, most preferred first.
pub fn proposals(phase: TurnPhase, color: AmpelColor) -> &'static [Proposal] {
    match (phase, color) {
        (TurnPhase::Entry, AmpelColor::Green) => ENTRY_GREEN,
        (TurnPhase::Entry, AmpelColor::Yellow) => ENTRY_YELLOW,
        (TurnPhase::Entry, AmpelColor::Red) => ENTRY_RED,
        (TurnPhase::Rotation, AmpelColor::Green) => ROTATION_GREEN,
        (TurnPhase::Rotation, AmpelColor::Yellow) => ROTATION_YELLOW,
        (TurnPhase::Rotation, AmpelColor::Red) => ROTATION_RED,
        (TurnPhase::Exit, AmpelColor::Green) => EXIT_GREEN,
        (TurnPhase::Exit, AmpelColor::Yellow) => EXIT_YELLOW,
        (TurnPhase::Exit, AmpelColor::Red) => EXIT_RED,
    }
}

#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    statistics: StatisticsService,
    rules: Arc<SafetyRuleTable>,
    config: CandidateConfig,
}

impl CandidateGenerator {
    pub fn new(statistics: StatisticsService, rules: Arc<SafetyRuleTable>, config: &CandidateConfig) -> Self {
        Self {
            statistics,
            rules,
            config: config.clone(),
        }
    }

    /// Candidates for one corner, best priority first, capped per corner.
    ///
    /// Phases without an ampel are generated as Green.
    pub fn generate_for_corner(
        &self,
        impact: &CornerImpact,
        analysis: Option<&TurnSlipAnalysis>,
    ) -> Vec<CoachingCandidate> {
        let color = |phase| {
            analysis
                .and_then(|a| a.color(phase))
                .unwrap_or(AmpelColor::Green)
        };

        if impact.needs_consistency_drill {
            debug!(corner = impact.corner_id, consistency = impact.consistency_score, "Consistency drill");
            return vec![Self::consistency_drill(impact)];
        }

        let mut candidates: Vec<CoachingCandidate> = TurnPhase::ALL
            .iter()
            .flat_map(|&phase| self.phase_candidates(impact, phase, color(phase)))
            .collect();

        candidates.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
        candidates.truncate(self.config.max_per_corner);
        candidates
    }

    /// Candidates for every selected corner that has an impact entry.
    pub fn generate(
        &self,
        impacts: &[CornerImpact],
        selected_corners: &[u32],
        board: &AmpelBoard,
    ) -> Vec<CoachingCandidate> {
        selected_corners
            .iter()
            .filter_map(|&id| {
                let impact = impacts.iter().find(|i| i.corner_id == id);
                if impact.is_none() {
                    warn!(corner = id, "Selected corner has no impact entry");
                }
                impact
            })
            .flat_map(|impact| self.generate_for_corner(impact, board.corner(impact.corner_id)))
            .collect()
    }

    fn phase_candidates(&self, impact: &CornerImpact, phase: TurnPhase, color: AmpelColor) -> Vec<CoachingCandidate> {
        let base_gain = self
            .statistics
            .expected_improvement(impact.delta_ms, 0.0, self.config.difficulty(phase));

        proposals(phase, color)
            .iter()
            .filter(|p| self.rules.is_allowed(phase, color, p.action_type, p.intensity))
            .take(self.config.max_per_phase)
            .map(|p| CoachingCandidate {
                corner_id: impact.corner_id,
                phase,
                action_type: p.action_type,
                intensity: p.intensity,
                expected_gain_ms: base_gain * p.gain_factor,
                confidence: p.confidence,
                safety_constraints: p.constraint.into_iter().collect(),
                priority_score: impact.improvement_potential() * p.confidence * color.safety_multiplier(),
            })
            .collect()
    }

    fn consistency_drill(impact: &CornerImpact) -> CoachingCandidate {
        CoachingCandidate {
            corner_id: impact.corner_id,
            phase: TurnPhase::Entry,
            action_type: ActionType::BrakeEarlier,
            intensity: ActionIntensity::VerySoft,
            expected_gain_ms: 0.0,
            confidence: CONSISTENCY_DRILL_CONFIDENCE,
            safety_constraints: vec![SafetyConstraint::ConsistencyDrillPrioritized],
            priority_score: CONSISTENCY_DRILL_PRIORITY,
        }
    }
}
