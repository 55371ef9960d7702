//! Safety Ampel Service - slip metrics to a Green/Yellow/Red traffic light per phase
//!
//! Entry watches front slip angle (turn-in grip), Exit watches rear slip
//! ratio (traction), Rotation uses the combined factor alone.

use std::collections::BTreeMap;
use tracing::trace;

use crate::config::{AmpelConfig, SlipConfig};
use crate::types::{
    AmpelColor, CoachingConstraints, PhaseSlip, SafetyAmpel, SlipMetrics, TurnPhase,
    TurnSlipAnalysis,
};

#[derive(Debug, Clone)]
pub struct SafetyAmpelService {
    ampel: AmpelConfig,
    ratio_range: f64,
    angle_range: f64,
    counts: BTreeMap<(TurnPhase, AmpelColor), u64>,
}

impl SafetyAmpelService {
    pub fn new(ampel: &AmpelConfig, slip: &SlipConfig) -> Self {
        Self {
            ampel: ampel.clone(),
            ratio_range: slip.ratio_range,
            angle_range: slip.angle_range,
            counts: BTreeMap::new(),
        }
    }

    /// Phase-effective slip factor in [0, 1].
    pub fn effective_factor(&self, phase: TurnPhase, metrics: &SlipMetrics) -> f64 {
        let combined = metrics.combined_slip_factor;
        let factor = match phase {
            TurnPhase::Entry => combined.max(metrics.front_slip_angle.abs() / self.angle_range),
            TurnPhase::Rotation => combined,
            TurnPhase::Exit => combined.max(metrics.rear_slip_ratio.abs() / self.ratio_range),
        };
        factor.min(1.0)
    }

    /// Map a factor to a color. A factor equal to a cutoff takes the lower color.
    pub fn color_for(&self, phase: TurnPhase, factor: f64) -> AmpelColor {
        let t = self.ampel.thresholds(phase);
        if factor <= t.green_max {
            AmpelColor::Green
        } else if factor <= t.yellow_max {
            AmpelColor::Yellow
        } else {
            AmpelColor::Red
        }
    }

    /// Trust in the reading, discounted for noise-suspect extremes and near-zero slip.
    pub fn confidence(&self, metrics: &SlipMetrics) -> f64 {
        let mut confidence = 1.0;
        if metrics.max_slip_ratio > self.ampel.extreme_slip_ratio {
            confidence *= 0.8;
        }
        if metrics.max_slip_angle > self.ampel.extreme_slip_angle {
            confidence *= 0.8;
        }
        if metrics.combined_slip_factor < self.ampel.low_slip_combined {
            confidence *= 0.9;
        }
        f64::max(self.ampel.min_confidence, confidence)
    }

    /// Classify one phase and count the outcome.
    pub fn classify(&mut self, phase: TurnPhase, metrics: &SlipMetrics) -> SafetyAmpel {
        let slip_factor = self.effective_factor(phase, metrics);
        let color = self.color_for(phase, slip_factor);
        *self.counts.entry((phase, color)).or_insert(0) += 1;
        trace!(%phase, %color, slip_factor, "Ampel classified");
        SafetyAmpel {
            phase,
            color,
            slip_factor,
            slip_metrics: *metrics,
            confidence: self.confidence(metrics),
        }
    }

    /// Ampels for every phase that has slip data.
    pub fn analyze(&mut self, phase_slip: &PhaseSlip) -> TurnSlipAnalysis {
        let mut analysis = TurnSlipAnalysis::default();
        for phase in TurnPhase::ALL {
            if let Some(metrics) = phase_slip.get(phase) {
                analysis.set(self.classify(phase, metrics));
            }
        }
        analysis
    }

    /// Ampels for all three phases from a single sample's metrics.
    pub fn analyze_sample(&mut self, metrics: &SlipMetrics) -> TurnSlipAnalysis {
        let mut analysis = TurnSlipAnalysis::default();
        for phase in TurnPhase::ALL {
            analysis.set(self.classify(phase, metrics));
        }
        analysis
    }

    /// Which kinds of coaching the ampels permit. A missing phase counts as Green.
    pub fn coaching_constraints(analysis: &TurnSlipAnalysis) -> CoachingConstraints {
        let color = |p| analysis.color(p).unwrap_or(AmpelColor::Green);
        let entry = color(TurnPhase::Entry);
        let rotation = color(TurnPhase::Rotation);
        let exit = color(TurnPhase::Exit);
        CoachingConstraints {
            brake_earlier: true,
            pressure_faster: entry != AmpelColor::Red,
            progressive_braking_required: entry == AmpelColor::Yellow,
            release_earlier: rotation != AmpelColor::Red,
            smooth_rotation_required: rotation == AmpelColor::Yellow,
            early_throttle: exit != AmpelColor::Red,
            progressive_throttle_required: exit == AmpelColor::Yellow,
            steering_reduction_required: exit == AmpelColor::Red,
        }
    }

    /// Classifications per (phase, color) since the last reset.
    pub fn counts(&self) -> &BTreeMap<(TurnPhase, AmpelColor), u64> {
        &self.counts
    }

    pub fn count(&self, phase: TurnPhase, color: AmpelColor) -> u64 {
        self.counts.get(&(phase, color)).copied().unwrap_or(0)
    }

    pub fn reset_counts(&mut self) {
        self.counts.clear();
    }
}
