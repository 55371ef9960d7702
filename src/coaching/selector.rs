//! Action Selector - turns resolved candidates into driver-facing actions

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::templates;
use crate::config::defaults::LOW_CONFIDENCE_NOTE_BELOW;
use crate::config::Locale;
use crate::types::{
    ActionIntensity, ActionType, AmpelBoard, CoachingCandidate, SafetyReport, SelectedAction,
    TurnPhase,
};

/// Per-lap summary of what was coached.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub actions_count: usize,
    pub expected_gain_ms: f64,
    pub corners_coached: Vec<u32>,
    pub phase_distribution: BTreeMap<TurnPhase, usize>,
    pub average_confidence: f64,
    pub action_types: Vec<ActionType>,
    pub intensities: Vec<ActionIntensity>,
    pub safety_report: SafetyReport,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionSelector {
    locale: Locale,
}

impl ActionSelector {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Attach text, focus hint, ampel color and an id to each candidate.
    pub fn select_final_actions(&self, candidates: &[CoachingCandidate], board: &AmpelBoard) -> Vec<SelectedAction> {
        let generated_at = Utc::now();
        candidates
            .iter()
            .map(|c| {
                let color = board.color_or_green(c.corner_id, c.phase);
                SelectedAction {
                    action_id: Uuid::new_v4().to_string(),
                    corner_id: c.corner_id,
                    phase: c.phase,
                    action_type: c.action_type,
                    intensity: c.intensity,
                    expected_gain_ms: c.expected_gain_ms,
                    confidence: c.confidence,
                    safety_ampel_color: color,
                    generated_at,
                    user_text: templates::user_text(c.action_type, c.intensity, self.locale).to_string(),
                    focus_hint: templates::focus_hint(c.action_type, color, self.locale).map(str::to_string),
                }
            })
            .collect()
    }

    /// Numbered, driver-facing lines for one lap.
    pub fn format_session_output(
        &self,
        actions: &[SelectedAction],
        corner_names: Option<&HashMap<u32, String>>,
    ) -> String {
        let phrases = templates::session_phrases(self.locale);
        if actions.is_empty() {
            return phrases.no_suggestions.to_string();
        }

        let mut lines = vec![phrases.header.to_string(), String::new()];
        for (i, action) in actions.iter().enumerate() {
            let name = corner_names
                .and_then(|names| names.get(&action.corner_id).cloned())
                .unwrap_or_else(|| format!("{} {}", phrases.corner, action.corner_id));
            lines.push(format!(
                "**{}. {}** ({}): {}",
                i + 1,
                name,
                templates::phase_label(action.phase, self.locale),
                action.coaching_message()
            ));
            if action.confidence < LOW_CONFIDENCE_NOTE_BELOW {
                lines.push(format!("   -> {}", phrases.try_carefully));
            }
            lines.push(String::new());
        }
        if actions.len() > 1 {
            lines.push(phrases.one_at_a_time.to_string());
        }
        lines.join("\n")
    }

    pub fn session_summary(&self, actions: &[SelectedAction], safety_report: &SafetyReport) -> SessionSummary {
        if actions.is_empty() {
            return SessionSummary {
                safety_report: safety_report.clone(),
                ..Default::default()
            };
        }

        let mut phase_distribution = BTreeMap::new();
        for action in actions {
            *phase_distribution.entry(action.phase).or_insert(0) += 1;
        }

        SessionSummary {
            actions_count: actions.len(),
            expected_gain_ms: actions.iter().map(|a| a.expected_gain_ms).sum(),
            corners_coached: actions.iter().map(|a| a.corner_id).collect(),
            phase_distribution,
            average_confidence: actions.iter().map(|a| a.confidence).sum::<f64>() / actions.len() as f64,
            action_types: actions.iter().map(|a| a.action_type).collect(),
            intensities: actions.iter().map(|a| a.intensity).collect(),
            safety_report: safety_report.clone(),
        }
    }
}
