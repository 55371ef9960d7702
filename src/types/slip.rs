//! Slip metrics and safety-ampel types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::TurnPhase;

// ============================================================================
// Slip Metrics
// ============================================================================

/// Normalized tyre-slip summary for one sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SlipMetrics {
    /// Front axle mean slip ratio
    pub front_slip_ratio: f64,
    /// Rear axle mean slip ratio
    pub rear_slip_ratio: f64,
    /// Largest absolute per-wheel slip ratio
    pub max_slip_ratio: f64,
    /// Front axle mean slip angle (rad)
    pub front_slip_angle: f64,
    /// Rear axle mean slip angle (rad)
    pub rear_slip_angle: f64,
    /// Largest absolute per-wheel slip angle (rad)
    pub max_slip_angle: f64,
    /// Longitudinal utilization 0.0-1.0
    pub longitudinal_factor: f64,
    /// Lateral utilization 0.0-1.0
    pub lateral_factor: f64,
    /// Combined grip utilization 0.0-1.0
    pub combined_slip_factor: f64,
}

impl SlipMetrics {
    /// All-zero metrics used when slip data is missing or malformed.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Boolean handling flags derived from slip metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SlipIndicators {
    pub wheelspin: bool,
    pub understeer: bool,
    pub oversteer: bool,
}

// ============================================================================
// Ampel
// ============================================================================

/// Traffic-light safety classification.
///
/// Ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmpelColor {
    #[default]
    Green,
    Yellow,
    Red,
}

impl AmpelColor {
    pub const ALL: [AmpelColor; 3] = [AmpelColor::Green, AmpelColor::Yellow, AmpelColor::Red];

    /// Priority discount applied to candidates coached under this color.
    pub fn safety_multiplier(&self) -> f64 {
        match self {
            AmpelColor::Green => 1.0,
            AmpelColor::Yellow => 0.8,
            AmpelColor::Red => 0.6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AmpelColor::Green => "green",
            AmpelColor::Yellow => "yellow",
            AmpelColor::Red => "red",
        }
    }
}

impl std::fmt::Display for AmpelColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmpelColor::Green => write!(f, "GREEN"),
            AmpelColor::Yellow => write!(f, "YELLOW"),
            AmpelColor::Red => write!(f, "RED"),
        }
    }
}

/// Safety classification of one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyAmpel {
    pub phase: TurnPhase,
    pub color: AmpelColor,
    /// Phase-effective slip factor the color was derived from
    pub slip_factor: f64,
    pub slip_metrics: SlipMetrics,
    /// 0.1-1.0
    pub confidence: f64,
}

/// Ampels for the three phases of one corner; any phase may be unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TurnSlipAnalysis {
    pub entry: Option<SafetyAmpel>,
    pub rotation: Option<SafetyAmpel>,
    pub exit: Option<SafetyAmpel>,
}

impl TurnSlipAnalysis {
    pub fn get(&self, phase: TurnPhase) -> Option<&SafetyAmpel> {
        match phase {
            TurnPhase::Entry => self.entry.as_ref(),
            TurnPhase::Rotation => self.rotation.as_ref(),
            TurnPhase::Exit => self.exit.as_ref(),
        }
    }

    pub fn set(&mut self, ampel: SafetyAmpel) {
        match ampel.phase {
            TurnPhase::Entry => self.entry = Some(ampel),
            TurnPhase::Rotation => self.rotation = Some(ampel),
            TurnPhase::Exit => self.exit = Some(ampel),
        }
    }

    pub fn color(&self, phase: TurnPhase) -> Option<AmpelColor> {
        self.get(phase).map(|a| a.color)
    }

    /// Phase with the lowest effective slip factor; ties go to the earlier phase.
    pub fn safest_phase_for_coaching(&self) -> Option<TurnPhase> {
        TurnPhase::ALL
            .iter()
            .filter_map(|&p| self.get(p).map(|a| (p, a.slip_factor)))
            .fold(None, |best: Option<(TurnPhase, f64)>, (p, factor)| match best {
                Some((_, best_factor)) if best_factor <= factor => best,
                _ => Some((p, factor)),
            })
            .map(|(p, _)| p)
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none() && self.rotation.is_none() && self.exit.is_none()
    }
}

/// Ampel analyses of every corner in one lap analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AmpelBoard {
    corners: HashMap<u32, TurnSlipAnalysis>,
}

impl AmpelBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, corner_id: u32, analysis: TurnSlipAnalysis) {
        self.corners.insert(corner_id, analysis);
    }

    pub fn corner(&self, corner_id: u32) -> Option<&TurnSlipAnalysis> {
        self.corners.get(&corner_id)
    }

    pub fn get(&self, corner_id: u32, phase: TurnPhase) -> Option<&SafetyAmpel> {
        self.corners.get(&corner_id).and_then(|a| a.get(phase))
    }

    /// Color for generation/selection, falling back to Green when unknown.
    pub fn color_or_green(&self, corner_id: u32, phase: TurnPhase) -> AmpelColor {
        self.get(corner_id, phase).map_or(AmpelColor::Green, |a| a.color)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &TurnSlipAnalysis)> {
        self.corners.iter()
    }

    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }
}

/// Which kinds of coaching the current ampels permit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoachingConstraints {
    pub brake_earlier: bool,
    pub pressure_faster: bool,
    pub progressive_braking_required: bool,
    pub release_earlier: bool,
    pub smooth_rotation_required: bool,
    pub early_throttle: bool,
    pub progressive_throttle_required: bool,
    pub steering_reduction_required: bool,
}
