//! Safety Gate Resolver - filter, de-conflict and cap coaching candidates
//!
//! Three independent passes, run in order by the coordinator:
//!
//! 1. `apply_safety_filter`: drop candidates the rule table forbids for their ampel
//! 2. `resolve_conflicts`: per corner, walk Entry → Rotation → Exit up to the action cap
//! 3. `enforce_global_limits`: best candidate per corner, capped per lap

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::rules::SafetyRuleTable;
use crate::config::ResolverConfig;
use crate::types::{
    ActionType, AmpelBoard, AmpelColor, CoachingCandidate, PhaseSafetySummary, SafetyConstraint,
    SafetyReport, TurnPhase,
};

/// Result of the safety filter pass.
#[derive(Debug, Clone, Default)]
pub struct SafetyFilterOutcome {
    pub passed: Vec<CoachingCandidate>,
    pub blocked: Vec<CoachingCandidate>,
}

/// Structural checks on a final selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionValidation {
    pub one_per_corner: bool,
    pub within_corner_limit: bool,
    pub no_phase_conflicts: bool,
    pub total_candidates: usize,
}

impl SelectionValidation {
    pub fn all_passed(&self) -> bool {
        self.one_per_corner && self.within_corner_limit && self.no_phase_conflicts
    }
}

#[derive(Debug, Clone)]
pub struct SafetyGateResolver {
    rules: Arc<SafetyRuleTable>,
    max_actions_per_corner: usize,
    max_corners_per_lap: usize,
}

impl SafetyGateResolver {
    pub fn new(rules: Arc<SafetyRuleTable>, config: &ResolverConfig) -> Self {
        Self {
            rules,
            max_actions_per_corner: config.max_actions_per_corner,
            max_corners_per_lap: config.max_corners_per_lap,
        }
    }

    /// Drop candidates not permitted under their phase's ampel.
    ///
    /// A candidate without ampel data passes, tagged `NoAmpelDataAvailable`.
    pub fn apply_safety_filter(
        &self,
        candidates: Vec<CoachingCandidate>,
        ampels: &AmpelBoard,
    ) -> SafetyFilterOutcome {
        let mut outcome = SafetyFilterOutcome::default();
        for mut candidate in candidates {
            let Some(ampel) = ampels.get(candidate.corner_id, candidate.phase) else {
                if !candidate.is_unverified() {
                    candidate
                        .safety_constraints
                        .push(SafetyConstraint::NoAmpelDataAvailable);
                }
                outcome.passed.push(candidate);
                continue;
            };

            if self.rules.is_allowed(
                candidate.phase,
                ampel.color,
                candidate.action_type,
                candidate.intensity,
            ) {
                outcome.passed.push(candidate);
            } else {
                debug!(
                    corner = candidate.corner_id,
                    phase = %candidate.phase,
                    action = %candidate.action_type,
                    intensity = %candidate.intensity,
                    ampel = %ampel.color,
                    "Candidate blocked by safety gate"
                );
                outcome.blocked.push(candidate);
            }
        }
        outcome
    }

    /// Per corner, take the best candidate of each phase in Entry → Rotation → Exit
    /// order until `max_actions_per_corner` is reached.
    pub fn resolve_conflicts(&self, candidates: Vec<CoachingCandidate>) -> Vec<CoachingCandidate> {
        let mut by_corner: BTreeMap<u32, BTreeMap<TurnPhase, CoachingCandidate>> = BTreeMap::new();
        for candidate in candidates {
            let phases = by_corner.entry(candidate.corner_id).or_default();
            match phases.get(&candidate.phase) {
                Some(best) if best.priority_score >= candidate.priority_score => {}
                _ => {
                    phases.insert(candidate.phase, candidate);
                }
            }
        }

        // BTreeMap iteration follows TurnPhase order, which is the priority order
        by_corner
            .into_values()
            .flat_map(|phases| phases.into_values().take(self.max_actions_per_corner))
            .collect()
    }

    /// Best candidate per corner, highest priority first, at most `max_corners_per_lap`.
    pub fn enforce_global_limits(&self, candidates: Vec<CoachingCandidate>) -> Vec<CoachingCandidate> {
        let mut best: BTreeMap<u32, CoachingCandidate> = BTreeMap::new();
        for candidate in candidates {
            match best.get(&candidate.corner_id) {
                Some(held) if held.priority_score >= candidate.priority_score => {}
                _ => {
                    best.insert(candidate.corner_id, candidate);
                }
            }
        }

        let mut finals: Vec<CoachingCandidate> = best.into_values().collect();
        finals.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
        finals.truncate(self.max_corners_per_lap);
        finals
    }

    /// Summary of one safety-filter pass.
    pub fn safety_report(
        &self,
        original: &[CoachingCandidate],
        filtered: &[CoachingCandidate],
        ampels: &AmpelBoard,
    ) -> SafetyReport {
        let total = original.len();
        let passed = filtered.len();
        let blocked = total.saturating_sub(passed);

        let mut ampel_distribution: BTreeMap<AmpelColor, usize> =
            AmpelColor::ALL.iter().map(|&c| (c, 0)).collect();
        for (_, analysis) in ampels.iter() {
            for phase in TurnPhase::ALL {
                if let Some(color) = analysis.color(phase) {
                    *ampel_distribution.entry(color).or_insert(0) += 1;
                }
            }
        }

        let mut by_action: BTreeMap<ActionType, isize> = BTreeMap::new();
        let mut phase_summary: BTreeMap<TurnPhase, PhaseSafetySummary> = BTreeMap::new();
        for c in original {
            *by_action.entry(c.action_type).or_insert(0) += 1;
            let s = phase_summary.entry(c.phase).or_default();
            s.total += 1;
            s.blocked += 1;
        }
        for c in filtered {
            *by_action.entry(c.action_type).or_insert(0) -= 1;
            let s = phase_summary.entry(c.phase).or_default();
            s.passed += 1;
            s.blocked = s.blocked.saturating_sub(1);
        }
        let blocked_by_action = by_action
            .into_iter()
            .filter(|&(_, n)| n > 0)
            .map(|(a, n)| (a, n as usize))
            .collect();

        // Candidates without an ampel always pass, so only colored ones count
        let mut by_color: BTreeMap<AmpelColor, isize> = BTreeMap::new();
        let color_of = |c: &CoachingCandidate| ampels.get(c.corner_id, c.phase).map(|a| a.color);
        for color in original.iter().filter_map(color_of) {
            *by_color.entry(color).or_insert(0) += 1;
        }
        for color in filtered.iter().filter_map(color_of) {
            *by_color.entry(color).or_insert(0) -= 1;
        }
        let blocked_by_color = by_color
            .into_iter()
            .filter(|&(_, n)| n > 0)
            .map(|(c, n)| (c, n as usize))
            .collect();

        SafetyReport {
            total_candidates: total,
            passed_candidates: passed,
            blocked_candidates: blocked,
            block_rate: if total == 0 { 0.0 } else { blocked as f64 / total as f64 },
            ampel_distribution,
            blocked_by_action,
            blocked_by_color,
            phase_summary,
        }
    }

    /// Check one-per-corner, the per-lap cap, and that no corner carries two phases.
    pub fn validate_final_selection(&self, selected: &[CoachingCandidate]) -> SelectionValidation {
        let mut corner_phases: BTreeMap<u32, Vec<TurnPhase>> = BTreeMap::new();
        for c in selected {
            corner_phases.entry(c.corner_id).or_default().push(c.phase);
        }
        let one_per_corner = corner_phases.len() == selected.len();
        let no_phase_conflicts = corner_phases.values().all(|phases| {
            phases.iter().all(|p| *p == phases[0])
        }) && one_per_corner;

        SelectionValidation {
            one_per_corner,
            within_corner_limit: corner_phases.len() <= self.max_corners_per_lap,
            no_phase_conflicts,
            total_candidates: selected.len(),
        }
    }

    pub fn rules(&self) -> &Arc<SafetyRuleTable> {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionIntensity, SafetyAmpel, SlipMetrics, TurnSlipAnalysis};

    fn resolver() -> SafetyGateResolver {
        SafetyGateResolver::new(SafetyRuleTable::shared(), &ResolverConfig::default())
    }

    fn cand(corner: u32, action: ActionType, intensity: ActionIntensity, priority: f64) -> CoachingCandidate {
        CoachingCandidate {
            corner_id: corner,
            phase: action.phase(),
            action_type: action,
            intensity,
            expected_gain_ms: 10.0,
            confidence: 0.8,
            safety_constraints: Vec::new(),
            priority_score: priority,
        }
    }

    fn board(corner: u32, phase: TurnPhase, color: AmpelColor) -> AmpelBoard {
        let mut analysis = TurnSlipAnalysis::default();
        analysis.set(SafetyAmpel {
            phase,
            color,
            slip_factor: 0.5,
            slip_metrics: SlipMetrics::zero(),
            confidence: 1.0,
        });
        let mut b = AmpelBoard::new();
        b.insert(corner, analysis);
        b
    }

    #[test]
    fn test_red_entry_blocks_pressure_faster() {
        let r = resolver();
        let ampels = board(1, TurnPhase::Entry, AmpelColor::Red);
        let outcome = r.apply_safety_filter(
            vec![
                cand(1, ActionType::BuildPressureFaster, ActionIntensity::Soft, 0.9),
                cand(1, ActionType::BrakeEarlier, ActionIntensity::Progressive, 0.5),
            ],
            &ampels,
        );
        assert_eq!(outcome.passed.len(), 1);
        assert_eq!(outcome.passed[0].action_type, ActionType::BrakeEarlier);
        assert_eq!(outcome.blocked.len(), 1);
    }

    #[test]
    fn test_missing_ampel_passes_unverified() {
        let r = resolver();
        let outcome = r.apply_safety_filter(
            vec![cand(7, ActionType::ReleaseEarlier, ActionIntensity::Fast, 0.4)],
            &AmpelBoard::new(),
        );
        assert_eq!(outcome.passed.len(), 1);
        assert!(outcome.passed[0].is_unverified());
    }

    #[test]
    fn test_resolve_conflicts_prefers_entry() {
        let r = resolver();
        let resolved = r.resolve_conflicts(vec![
            cand(1, ActionType::ThrottleEarlierProgressive, ActionIntensity::Progressive, 0.99),
            cand(1, ActionType::BrakeEarlier, ActionIntensity::Progressive, 0.2),
            cand(1, ActionType::BuildPressureFaster, ActionIntensity::Fast, 0.3),
            cand(2, ActionType::ReleaseEarlier, ActionIntensity::Soft, 0.5),
        ]);
        assert_eq!(resolved.len(), 2);
        let c1 = resolved.iter().find(|c| c.corner_id == 1).unwrap();
        assert_eq!(c1.phase, TurnPhase::Entry);
        assert_eq!(c1.action_type, ActionType::BuildPressureFaster);
    }

    #[test]
    fn test_global_limits_cap_corners() {
        let r = resolver();
        let finals = r.enforce_global_limits(vec![
            cand(1, ActionType::BrakeEarlier, ActionIntensity::Soft, 0.1),
            cand(2, ActionType::BrakeEarlier, ActionIntensity::Soft, 0.4),
            cand(2, ActionType::ReleaseEarlier, ActionIntensity::Soft, 0.6),
            cand(3, ActionType::BrakeEarlier, ActionIntensity::Soft, 0.3),
            cand(4, ActionType::BrakeEarlier, ActionIntensity::Soft, 0.2),
        ]);
        let corners: Vec<u32> = finals.iter().map(|c| c.corner_id).collect();
        assert_eq!(corners, vec![2, 3, 4]);
        assert_eq!(finals[0].action_type, ActionType::ReleaseEarlier);
        assert!(r.validate_final_selection(&finals).all_passed());
    }

    #[test]
    fn test_validation_flags_duplicates() {
        let r = resolver();
        let v = r.validate_final_selection(&[
            cand(1, ActionType::BrakeEarlier, ActionIntensity::Soft, 0.1),
            cand(1, ActionType::ReleaseEarlier, ActionIntensity::Soft, 0.2),
        ]);
        assert!(!v.one_per_corner);
        assert!(!v.no_phase_conflicts);
        assert!(!v.all_passed());
    }

    #[test]
    fn test_safety_report_counts() {
        let r = resolver();
        let ampels = board(1, TurnPhase::Entry, AmpelColor::Red);
        let original = vec![
            cand(1, ActionType::BuildPressureFaster, ActionIntensity::Soft, 0.9),
            cand(1, ActionType::BrakeEarlier, ActionIntensity::Progressive, 0.5),
        ];
        let outcome = r.apply_safety_filter(original.clone(), &ampels);
        let report = r.safety_report(&original, &outcome.passed, &ampels);
        assert_eq!(report.total_candidates, 2);
        assert_eq!(report.blocked_candidates, 1);
        assert!((report.block_rate - 0.5).abs() < 1e-12);
        assert_eq!(report.blocked_by_action.get(&ActionType::BuildPressureFaster), Some(&1));
        assert_eq!(report.ampel_distribution[&AmpelColor::Red], 1);
        let entry = report.phase_summary[&TurnPhase::Entry];
        assert_eq!((entry.total, entry.passed, entry.blocked), (2, 1, 1));

        let empty = r.safety_report(&[], &[], &AmpelBoard::new());
        assert_eq!(empty.block_rate, 0.0);
        assert!(empty.blocked_by_color.is_empty());
    }

    #[test]
    fn test_safety_report_counts_blocked_by_color() {
        let r = resolver();
        let mut ampels = board(1, TurnPhase::Entry, AmpelColor::Red);
        let mut yellow = TurnSlipAnalysis::default();
        yellow.set(SafetyAmpel {
            phase: TurnPhase::Exit,
            color: AmpelColor::Yellow,
            slip_factor: 0.5,
            slip_metrics: SlipMetrics::zero(),
            confidence: 1.0,
        });
        ampels.insert(2, yellow);

        let original = vec![
            // Red entry: blocked
            cand(1, ActionType::BuildPressureFaster, ActionIntensity::Soft, 0.9),
            cand(1, ActionType::BuildPressureFaster, ActionIntensity::VerySoft, 0.8),
            // Red entry: permitted
            cand(1, ActionType::BrakeEarlier, ActionIntensity::VerySoft, 0.5),
            // Yellow exit: blocked, then permitted
            cand(2, ActionType::ThrottleEarlierProgressive, ActionIntensity::Fast, 0.7),
            cand(2, ActionType::ThrottleEarlierProgressive, ActionIntensity::VerySoft, 0.6),
            // No ampel: passes unverified, never counted
            cand(3, ActionType::ReleaseEarlier, ActionIntensity::Fast, 0.4),
        ];
        let outcome = r.apply_safety_filter(original.clone(), &ampels);
        let report = r.safety_report(&original, &outcome.passed, &ampels);

        assert_eq!(report.blocked_candidates, 3);
        assert_eq!(report.blocked_by_color.get(&AmpelColor::Red), Some(&2));
        assert_eq!(report.blocked_by_color.get(&AmpelColor::Yellow), Some(&1));
        assert_eq!(report.blocked_by_color.get(&AmpelColor::Green), None);
        assert_eq!(report.blocked_by_color.values().sum::<usize>(), report.blocked_candidates);
    }
}
