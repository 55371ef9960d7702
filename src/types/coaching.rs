//! Coaching action taxonomy, candidates, selected actions and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AmpelColor, CornerImpact, PerformanceMode, TurnPhase};

// ============================================================================
// Action taxonomy
// ============================================================================

/// Kind of coaching action. Every action belongs to exactly one phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    BrakeEarlier,
    BuildPressureFaster,
    ReleaseEarlier,
    ThrottleEarlierProgressive,
    ReduceSteeringThenGas,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::BrakeEarlier,
        ActionType::BuildPressureFaster,
        ActionType::ReleaseEarlier,
        ActionType::ThrottleEarlierProgressive,
        ActionType::ReduceSteeringThenGas,
    ];

    /// Phase this action is coached in.
    pub fn phase(&self) -> TurnPhase {
        match self {
            ActionType::BrakeEarlier | ActionType::BuildPressureFaster => TurnPhase::Entry,
            ActionType::ReleaseEarlier => TurnPhase::Rotation,
            ActionType::ThrottleEarlierProgressive | ActionType::ReduceSteeringThenGas => {
                TurnPhase::Exit
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::BrakeEarlier => "brake_earlier",
            ActionType::BuildPressureFaster => "build_pressure_faster",
            ActionType::ReleaseEarlier => "release_earlier",
            ActionType::ThrottleEarlierProgressive => "throttle_earlier_progressive",
            ActionType::ReduceSteeringThenGas => "reduce_steering_then_gas",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How strongly an action should be applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionIntensity {
    VerySoft,
    Soft,
    Progressive,
    Fast,
    VeryFast,
}

impl ActionIntensity {
    pub const ALL: [ActionIntensity; 5] = [
        ActionIntensity::VerySoft,
        ActionIntensity::Soft,
        ActionIntensity::Progressive,
        ActionIntensity::Fast,
        ActionIntensity::VeryFast,
    ];

    /// Intensities that may be coached under a Yellow ampel.
    pub fn is_gentle(&self) -> bool {
        match self {
            ActionIntensity::VerySoft | ActionIntensity::Soft | ActionIntensity::Progressive => true,
            ActionIntensity::Fast | ActionIntensity::VeryFast => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionIntensity::VerySoft => "very_soft",
            ActionIntensity::Soft => "soft",
            ActionIntensity::Progressive => "progressive",
            ActionIntensity::Fast => "fast",
            ActionIntensity::VeryFast => "very_fast",
        }
    }
}

impl std::fmt::Display for ActionIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Safety annotation attached to a candidate during generation or filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SafetyConstraint {
    EntrySlipRedBlocksPressureFaster,
    YellowAmpelProgressiveOnly,
    YellowAmpelSoftOnly,
    YellowAmpelSoftRelease,
    RedAmpelVerySoftRelease,
    ExitSlipRedBlocksEarlyThrottle,
    YellowAmpelVerySoftThrottle,
    YellowAmpelSoftSteering,
    ConsistencyDrillPrioritized,
    /// Passed the safety filter without ampel data ("unverified")
    NoAmpelDataAvailable,
}

impl std::fmt::Display for SafetyConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SafetyConstraint::EntrySlipRedBlocksPressureFaster => "entry_slip_red_blocks_pressure_faster",
            SafetyConstraint::YellowAmpelProgressiveOnly => "yellow_ampel_progressive_only",
            SafetyConstraint::YellowAmpelSoftOnly => "yellow_ampel_soft_only",
            SafetyConstraint::YellowAmpelSoftRelease => "yellow_ampel_soft_release",
            SafetyConstraint::RedAmpelVerySoftRelease => "red_ampel_very_soft_release",
            SafetyConstraint::ExitSlipRedBlocksEarlyThrottle => "exit_slip_red_blocks_early_throttle",
            SafetyConstraint::YellowAmpelVerySoftThrottle => "yellow_ampel_very_soft_throttle",
            SafetyConstraint::YellowAmpelSoftSteering => "yellow_ampel_soft_steering",
            SafetyConstraint::ConsistencyDrillPrioritized => "consistency_drill_prioritized",
            SafetyConstraint::NoAmpelDataAvailable => "no_ampel_data_available",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Candidates and selected actions
// ============================================================================

/// A proposed, not yet finalized coaching action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoachingCandidate {
    pub corner_id: u32,
    pub phase: TurnPhase,
    pub action_type: ActionType,
    pub intensity: ActionIntensity,
    pub expected_gain_ms: f64,
    pub confidence: f64,
    pub safety_constraints: Vec<SafetyConstraint>,
    pub priority_score: f64,
}

impl CoachingCandidate {
    /// True when the candidate passed the safety filter without ampel data.
    pub fn is_unverified(&self) -> bool {
        self.safety_constraints
            .contains(&SafetyConstraint::NoAmpelDataAvailable)
    }
}

/// Final coaching action handed to persistence and presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedAction {
    pub action_id: String,
    pub corner_id: u32,
    pub phase: TurnPhase,
    pub action_type: ActionType,
    pub intensity: ActionIntensity,
    pub expected_gain_ms: f64,
    pub confidence: f64,
    pub safety_ampel_color: AmpelColor,
    pub generated_at: DateTime<Utc>,
    pub user_text: String,
    pub focus_hint: Option<String>,
}

impl SelectedAction {
    /// User text followed by the focus hint, if any.
    pub fn coaching_message(&self) -> String {
        match &self.focus_hint {
            Some(hint) => format!("{} {}", self.user_text, hint),
            None => self.user_text.clone(),
        }
    }
}

/// Outcome of a previously selected action, produced by an external evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub action_id: String,
    pub corner_id: u32,
    pub attempt_detected: bool,
    pub success: bool,
    pub overtrained: bool,
    pub actual_gain_ms: Option<f64>,
    pub slip_violations: Vec<String>,
    pub evaluation_laps: u32,
    pub evaluation_completed_at: DateTime<Utc>,
}

impl ActionResult {
    pub fn coaching_feedback(&self) -> &'static str {
        if !self.attempt_detected {
            "No attempt detected - focus on the suggested technique."
        } else if self.overtrained {
            "Good attempt, but ease off slightly to maintain control."
        } else if self.success {
            "Excellent improvement! Keep it up."
        } else {
            "Good attempt - let's try a different approach."
        }
    }
}

// ============================================================================
// Safety report
// ============================================================================

/// Pass/block counts for one phase.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseSafetySummary {
    pub total: usize,
    pub passed: usize,
    pub blocked: usize,
}

/// Summary of one safety-filter pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SafetyReport {
    pub total_candidates: usize,
    pub passed_candidates: usize,
    pub blocked_candidates: usize,
    /// blocked / total, 0.0 when there were no candidates
    pub block_rate: f64,
    /// Ampel colors across all analysed corner phases
    pub ampel_distribution: BTreeMap<AmpelColor, usize>,
    pub blocked_by_action: BTreeMap<ActionType, usize>,
    /// Blocked candidates keyed by the ampel color that blocked them
    #[serde(default)]
    pub blocked_by_color: BTreeMap<AmpelColor, usize>,
    pub phase_summary: BTreeMap<TurnPhase, PhaseSafetySummary>,
}

impl std::fmt::Display for SafetyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Safety: {} candidates, {} passed, {} blocked ({:.0}%)",
            self.total_candidates,
            self.passed_candidates,
            self.blocked_candidates,
            self.block_rate * 100.0
        )
    }
}

// ============================================================================
// Analysis session
// ============================================================================

/// Output of one per-lap corner analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CornerAnalysisSession {
    pub session_uid: u64,
    pub track_id: i32,
    pub lap_number: u16,
    pub corner_impacts: Vec<CornerImpact>,
    pub selected_corners: Vec<u32>,
    pub generated_candidates: Vec<CoachingCandidate>,
    pub selected_actions: Vec<SelectedAction>,
    pub safety_report: SafetyReport,
    pub performance_mode: Option<PerformanceMode>,
    pub analysis_duration_ms: f64,
    pub analysis_timestamp: DateTime<Utc>,
    pub assist_filter: String,
    pub device_filter: String,
}

impl CornerAnalysisSession {
    /// Pace opportunities (non-drill corners), best first, at most three.
    pub fn top_improvement_opportunities(&self) -> Vec<&CornerImpact> {
        let mut pace: Vec<&CornerImpact> = self
            .corner_impacts
            .iter()
            .filter(|i| !i.needs_consistency_drill)
            .collect();
        pace.sort_by(|a, b| b.improvement_potential().total_cmp(&a.improvement_potential()));
        pace.truncate(3);
        pace
    }

    pub fn consistency_drills(&self) -> Vec<&CornerImpact> {
        self.corner_impacts
            .iter()
            .filter(|i| i.needs_consistency_drill)
            .collect()
    }

    pub fn total_expected_gain_ms(&self) -> f64 {
        self.selected_actions.iter().map(|a| a.expected_gain_ms).sum()
    }
}
