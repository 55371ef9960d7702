//! Reference quality scoring
//!
//! A reference earns up to 0.5 for sample size, 0.3 for recency and 0.2 for a
//! plausible IQR/median spread.

use chrono::{DateTime, Utc};

use crate::config::defaults::{
    REFERENCE_FULL_SAMPLE_COUNT, REFERENCE_MIN_RECENCY, REFERENCE_STALE_AFTER_DAYS,
};
use crate::types::CornerReference;

const SAMPLE_WEIGHT: f64 = 0.5;
const RECENCY_WEIGHT: f64 = 0.3;
const SPREAD_WEIGHT: f64 = 0.2;

/// Plausible IQR/median band; outside it the spread score halves.
const SPREAD_RATIO_MIN: f64 = 0.01;
const SPREAD_RATIO_MAX: f64 = 0.2;

/// Quality in [0, 1] of a reference as of `now`.
pub fn quality_score(reference: &CornerReference, now: DateTime<Utc>) -> f64 {
    let sample_score = (f64::from(reference.sample_count) / REFERENCE_FULL_SAMPLE_COUNT).min(1.0);

    let age_days = (now - reference.last_updated).num_days().max(0) as f64;
    let recency_score = (1.0 - age_days / REFERENCE_STALE_AFTER_DAYS).max(REFERENCE_MIN_RECENCY);

    let ratio = if reference.median_time_ms > 0.0 {
        reference.iqr_ms / reference.median_time_ms
    } else {
        0.0
    };
    let spread_score = if (SPREAD_RATIO_MIN..=SPREAD_RATIO_MAX).contains(&ratio) {
        1.0
    } else {
        0.5
    };

    sample_score * SAMPLE_WEIGHT + recency_score * RECENCY_WEIGHT + spread_score * SPREAD_WEIGHT
}

/// References scoring at least `min_quality`.
pub fn filter_high_quality(
    references: &[CornerReference],
    min_quality: f64,
    now: DateTime<Utc>,
) -> Vec<CornerReference> {
    references
        .iter()
        .filter(|r| quality_score(r, now) >= min_quality)
        .cloned()
        .collect()
}
