//! Corner Ranker - orders corners by IQR-normalized time loss
//!
//! Corners whose driver spread is far wider than the reference spread are
//! routed to consistency drills ahead of any pace work.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::config::RankingConfig;
use crate::statistics::{self, StatisticsService};
use crate::types::{CornerImpact, CornerReference};

#[derive(Debug, Clone)]
pub struct CornerRanker {
    statistics: StatisticsService,
    /// Minimum samples per corner, before and after outlier rejection
    min_corner_samples: usize,
}

impl CornerRanker {
    pub fn new(statistics: StatisticsService, config: &RankingConfig) -> Self {
        Self {
            statistics,
            min_corner_samples: config.min_corner_samples,
        }
    }

    /// Impact of every rankable corner, largest first, at most `max_corners`.
    ///
    /// Corners without a reference or with too few samples are skipped.
    pub fn rank(
        &self,
        driver_times: &BTreeMap<u32, Vec<f64>>,
        references: &[CornerReference],
        max_corners: usize,
    ) -> Vec<CornerImpact> {
        let lookup: HashMap<u32, &CornerReference> =
            references.iter().map(|r| (r.corner_id, r)).collect();

        let mut impacts: Vec<CornerImpact> = driver_times
            .iter()
            .filter_map(|(&corner_id, times)| {
                let Some(reference) = lookup.get(&corner_id) else {
                    debug!(corner = corner_id, "No reference, corner skipped");
                    return None;
                };
                if times.len() < self.min_corner_samples {
                    return None;
                }
                let (filtered, _) = self.statistics.filter_outliers(times);
                if filtered.len() < self.min_corner_samples {
                    return None;
                }
                Some(self.impact(corner_id, &filtered, reference))
            })
            .collect();

        // Stable sort over BTreeMap order keeps ties by corner id
        impacts.sort_by(|a, b| b.normalized_impact.total_cmp(&a.normalized_impact));
        impacts.truncate(max_corners);
        impacts
    }

    fn impact(&self, corner_id: u32, times: &[f64], reference: &CornerReference) -> CornerImpact {
        let driver_median = statistics::median(times);
        let consistency_score = statistics::consistency_score(times, reference.iqr_ms);
        CornerImpact {
            corner_id,
            delta_ms: driver_median - reference.median_time_ms,
            normalized_impact: statistics::normalized_impact(
                driver_median,
                reference.median_time_ms,
                reference.iqr_ms,
            ),
            consistency_score,
            sample_count: times.len(),
            reference_median_ms: reference.median_time_ms,
            reference_iqr_ms: reference.iqr_ms,
            needs_consistency_drill: self.statistics.needs_consistency_drill(consistency_score),
        }
    }

    /// Split into (pace opportunities, consistency drills).
    ///
    /// Drills are ordered by consistency score, pace by impact, both descending.
    pub fn coaching_priorities(&self, impacts: &[CornerImpact]) -> (Vec<CornerImpact>, Vec<CornerImpact>) {
        let (mut drills, mut pace): (Vec<CornerImpact>, Vec<CornerImpact>) = impacts
            .iter()
            .cloned()
            .partition(|i| self.statistics.needs_consistency_drill(i.consistency_score));
        pace.sort_by(|a, b| b.improvement_potential().total_cmp(&a.improvement_potential()));
        drills.sort_by(|a, b| b.consistency_score.total_cmp(&a.consistency_score));
        (pace, drills)
    }

    /// Corner ids to coach: drills first, remaining slots filled with pace work.
    pub fn select_coaching_corners(&self, impacts: &[CornerImpact], max_corners: usize) -> Vec<u32> {
        let (pace, drills) = self.coaching_priorities(impacts);
        drills
            .iter()
            .chain(pace.iter())
            .take(max_corners)
            .map(|i| i.corner_id)
            .collect()
    }
}
