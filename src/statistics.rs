//! Statistics Service - robust spread, outlier rejection and improvement estimates
//!
//! All corner comparisons are expressed in reference-IQR units so that long
//! and short corners rank on the same scale.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::defaults::{CONSISTENT_SPREAD_RATIO, FAST_LAP_ADVANTAGE_RATIO};
use crate::config::{OutlierMethod, StatisticsConfig};
use crate::types::PerformanceMode;

/// Quartile summary of a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileStats {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub iqr: f64,
    pub count: usize,
}

/// Percentile `p` (0-100) of sorted data, linear interpolation between closest ranks.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// p25/p50/p75 and IQR. Empty input gives all zeros.
pub fn percentiles(values: &[f64]) -> PercentileStats {
    if values.is_empty() {
        return PercentileStats::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let p25 = percentile_sorted(&sorted, 25.0);
    let p75 = percentile_sorted(&sorted, 75.0);
    PercentileStats {
        p25,
        p50: percentile_sorted(&sorted, 50.0),
        p75,
        iqr: p75 - p25,
        count: values.len(),
    }
}

pub fn median(values: &[f64]) -> f64 {
    percentiles(values).p50
}

/// How far `value` sits above `median` in IQR units; never negative, 0 when `iqr <= 0`.
pub fn normalized_impact(value: f64, median: f64, iqr: f64) -> f64 {
    if iqr <= 0.0 {
        return 0.0;
    }
    ((value - median) / iqr).max(0.0)
}

/// Driver IQR relative to the reference IQR; 0 with fewer than 2 values or `ref_iqr <= 0`.
pub fn consistency_score(values: &[f64], reference_iqr: f64) -> f64 {
    if values.len() < 2 || reference_iqr <= 0.0 {
        return 0.0;
    }
    percentiles(values).iqr / reference_iqr
}

#[derive(Debug, Clone)]
pub struct StatisticsService {
    config: StatisticsConfig,
}

impl StatisticsService {
    pub fn new(config: &StatisticsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Reject outliers with the configured method.
    pub fn filter_outliers(&self, values: &[f64]) -> (Vec<f64>, Vec<usize>) {
        self.filter_outliers_with(values, self.config.outlier_method)
    }

    /// Reject outliers until none remain, returning kept values (original order)
    /// and the original indices of rejected ones.
    ///
    /// Repeating until stable makes rejection idempotent: running it again on its
    /// own output removes nothing. Below `min_samples_for_outliers` nothing is rejected.
    pub fn filter_outliers_with(&self, values: &[f64], method: OutlierMethod) -> (Vec<f64>, Vec<usize>) {
        let mut kept: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
        let mut rejected = Vec::new();

        loop {
            if kept.len() < self.config.min_samples_for_outliers {
                break;
            }
            let current: Vec<f64> = kept.iter().map(|&(_, v)| v).collect();
            let Some((lower, upper)) = self.bounds(&current, method) else {
                break;
            };
            let before = kept.len();
            kept.retain(|&(i, v)| {
                let inside = v >= lower && v <= upper;
                if !inside {
                    rejected.push(i);
                }
                inside
            });
            if kept.len() == before {
                break;
            }
        }

        rejected.sort_unstable();
        (kept.into_iter().map(|(_, v)| v).collect(), rejected)
    }

    /// Inclusive acceptance interval, or `None` when the method cannot reject anything.
    fn bounds(&self, values: &[f64], method: OutlierMethod) -> Option<(f64, f64)> {
        match method {
            OutlierMethod::Iqr => {
                let stats = percentiles(values);
                let k = self.config.outlier_iqr_factor;
                Some((stats.p25 - k * stats.iqr, stats.p75 + k * stats.iqr))
            }
            OutlierMethod::ZScore => {
                let mean = values.mean();
                let std = values.population_std_dev();
                if !(std > 0.0) {
                    return None;
                }
                let k = self.config.zscore_threshold;
                Some((mean - k * std, mean + k * std))
            }
        }
    }

    /// Realizable gain (ms) of closing the gap from `current` to `reference`.
    ///
    /// `max(0, current - reference) × realization × (1 - discount × difficulty)`
    pub fn expected_improvement(&self, current: f64, reference: f64, difficulty: f64) -> f64 {
        let potential = (current - reference).max(0.0);
        let difficulty_factor = 1.0 - difficulty * self.config.difficulty_discount;
        potential * self.config.improvement_realization * difficulty_factor
    }

    pub fn needs_consistency_drill(&self, consistency_score: f64) -> bool {
        consistency_score > self.config.consistency_drill_threshold
    }

    pub fn consistency_drill_threshold(&self) -> f64 {
        self.config.consistency_drill_threshold
    }

    /// Whether lap times show a tight spread or occasional clearly quicker laps.
    pub fn performance_mode(&self, lap_times: &[f64]) -> Option<PerformanceMode> {
        let min_samples = self.config.performance_mode_min_samples;
        if lap_times.len() < min_samples {
            return None;
        }
        let (filtered, _) = self.filter_outliers(lap_times);
        if filtered.len() < min_samples {
            return None;
        }

        let stats = percentiles(&filtered);
        if stats.p50 <= 0.0 {
            return Some(PerformanceMode::Consistent);
        }
        if stats.iqr / stats.p50 < CONSISTENT_SPREAD_RATIO {
            return Some(PerformanceMode::Consistent);
        }

        let mut sorted = filtered;
        sorted.sort_by(f64::total_cmp);
        let take = (sorted.len() / 10).max(1);
        let fastest_mean = sorted[..take].mean();
        if (stats.p50 - fastest_mean) / stats.p50 > FAST_LAP_ADVANTAGE_RATIO {
            Some(PerformanceMode::Fast)
        } else {
            Some(PerformanceMode::Consistent)
        }
    }
}
