//! Corner reference baselines and per-analysis corner impact

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistical baseline for one corner, maintained by an external aggregation job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CornerReference {
    pub corner_id: u32,
    pub median_time_ms: f64,
    #[serde(default)]
    pub q1_ms: f64,
    #[serde(default)]
    pub q3_ms: f64,
    pub iqr_ms: f64,
    pub sample_count: u32,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    /// Assist configuration the reference was built for (e.g. "abs_on")
    #[serde(default)]
    pub assist_filter: String,
    /// Input device the reference was built for (e.g. "wheel")
    #[serde(default)]
    pub device_filter: String,
    #[serde(default)]
    pub preferred_line: Option<String>,
}

/// How far a driver is from the reference in one corner, computed fresh per analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CornerImpact {
    pub corner_id: u32,
    /// Driver median minus reference median (ms); positive is slower
    pub delta_ms: f64,
    /// Delta in reference-IQR units, never negative
    pub normalized_impact: f64,
    /// Driver IQR / reference IQR; higher is more erratic
    pub consistency_score: f64,
    /// Samples that survived outlier rejection
    pub sample_count: usize,
    pub reference_median_ms: f64,
    pub reference_iqr_ms: f64,
    /// Consistency score exceeded the drill threshold at ranking time
    pub needs_consistency_drill: bool,
}

impl CornerImpact {
    pub fn improvement_potential(&self) -> f64 {
        self.normalized_impact
    }
}

/// Preferred lap-time profile of a driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    /// Tight lap-time spread
    Consistent,
    /// Occasional laps clearly quicker than the median
    Fast,
}

impl std::fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformanceMode::Consistent => write!(f, "consistent"),
            PerformanceMode::Fast => write!(f, "fast"),
        }
    }
}
