//! Slip Calculator - per-wheel slip to normalized grip utilization
//!
//! Wheel order is RL, RR, FL, FR. Missing or damaged slip blocks never halt
//! the pipeline: they produce all-zero metrics.

use tracing::debug;

use crate::config::SlipConfig;
use crate::types::{wheel, SlipIndicators, SlipMetrics, WheelSlip};

#[derive(Debug, Clone)]
pub struct SlipCalculator {
    config: SlipConfig,
}

impl SlipCalculator {
    pub fn new(config: &SlipConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Compute slip metrics; malformed input yields `SlipMetrics::zero()`.
    pub fn calculate(&self, slip: &WheelSlip) -> SlipMetrics {
        let Some((ratios, angles)) = validated(slip) else {
            debug!(
                ratios = slip.slip_ratio.len(),
                angles = slip.slip_angle.len(),
                "Malformed wheel slip block, using zero metrics"
            );
            return SlipMetrics::zero();
        };

        let front_slip_ratio = (ratios[wheel::FRONT_LEFT] + ratios[wheel::FRONT_RIGHT]) / 2.0;
        let rear_slip_ratio = (ratios[wheel::REAR_LEFT] + ratios[wheel::REAR_RIGHT]) / 2.0;
        let front_slip_angle = (angles[wheel::FRONT_LEFT] + angles[wheel::FRONT_RIGHT]) / 2.0;
        let rear_slip_angle = (angles[wheel::REAR_LEFT] + angles[wheel::REAR_RIGHT]) / 2.0;

        let longitudinal_factor =
            (front_slip_ratio.abs().max(rear_slip_ratio.abs()) / self.config.ratio_range).min(1.0);
        let lateral_factor =
            (front_slip_angle.abs().max(rear_slip_angle.abs()) / self.config.angle_range).min(1.0);
        let combined_slip_factor = (longitudinal_factor.hypot(lateral_factor)
            / std::f64::consts::SQRT_2)
            .clamp(0.0, 1.0);

        SlipMetrics {
            front_slip_ratio,
            rear_slip_ratio,
            max_slip_ratio: abs_max(ratios),
            front_slip_angle,
            rear_slip_angle,
            max_slip_angle: abs_max(angles),
            longitudinal_factor,
            lateral_factor,
            combined_slip_factor,
        }
    }

    /// Metrics for an optional slip block; absent data counts as zero slip.
    pub fn calculate_optional(&self, slip: Option<&WheelSlip>) -> SlipMetrics {
        slip.map_or_else(SlipMetrics::zero, |s| self.calculate(s))
    }

    /// Handling flags: rear wheelspin and front/rear slip-angle balance.
    pub fn indicators(&self, slip: &WheelSlip) -> SlipIndicators {
        let Some((ratios, _)) = validated(slip) else {
            return SlipIndicators::default();
        };
        let metrics = self.calculate(slip);
        let rear_spin = ratios[wheel::REAR_LEFT].abs().max(ratios[wheel::REAR_RIGHT].abs());
        let balance = metrics.front_slip_angle.abs() - metrics.rear_slip_angle.abs();

        SlipIndicators {
            wheelspin: rear_spin > self.config.wheelspin_slip_ratio,
            understeer: balance > self.config.balance_slip_angle,
            oversteer: -balance > self.config.balance_slip_angle,
        }
    }
}

fn validated(slip: &WheelSlip) -> Option<(&[f64], &[f64])> {
    let ok = slip.slip_ratio.len() == wheel::COUNT
        && slip.slip_angle.len() == wheel::COUNT
        && slip
            .slip_ratio
            .iter()
            .chain(slip.slip_angle.iter())
            .all(|v| v.is_finite());
    ok.then_some((slip.slip_ratio.as_slice(), slip.slip_angle.as_slice()))
}

fn abs_max(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}
