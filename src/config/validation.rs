//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility range checks.
//!
//! Two-pass parse: the raw TOML is first walked as a `toml::Value` tree and
//! compared against the known field names, emitting "did you mean?" warnings.
//! Normal serde deserialization follows. Warnings never break a config.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `CoachConfig`.
///
/// Maintained by hand alongside coach_config.rs. A new field must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [driver]
        "driver",
        "driver.assist_filter",
        "driver.device_filter",
        // [gating]
        "gating",
        "gating.time_trial_session_type",
        // [markers]
        "markers",
        "markers.brake_threshold",
        "markers.throttle_threshold",
        "markers.hysteresis_window",
        "markers.peak_min_brake",
        "markers.opening_min_delta",
        // [slip]
        "slip",
        "slip.ratio_range",
        "slip.angle_range",
        "slip.wheelspin_slip_ratio",
        "slip.balance_slip_angle",
        // [ampel]
        "ampel",
        "ampel.entry",
        "ampel.entry.green_max",
        "ampel.entry.yellow_max",
        "ampel.rotation",
        "ampel.rotation.green_max",
        "ampel.rotation.yellow_max",
        "ampel.exit",
        "ampel.exit.green_max",
        "ampel.exit.yellow_max",
        "ampel.extreme_slip_ratio",
        "ampel.extreme_slip_angle",
        "ampel.low_slip_combined",
        "ampel.min_confidence",
        // [statistics]
        "statistics",
        "statistics.outlier_method",
        "statistics.outlier_iqr_factor",
        "statistics.min_samples_for_outliers",
        "statistics.zscore_threshold",
        "statistics.consistency_drill_threshold",
        "statistics.improvement_realization",
        "statistics.difficulty_discount",
        "statistics.performance_mode_min_samples",
        // [ranking]
        "ranking",
        "ranking.max_ranked_corners",
        "ranking.max_coaching_corners",
        "ranking.min_corner_samples",
        "ranking.min_reference_quality",
        "ranking.corner_history_laps",
        // [candidates]
        "candidates",
        "candidates.max_per_corner",
        "candidates.max_per_phase",
        "candidates.entry_difficulty",
        "candidates.rotation_difficulty",
        "candidates.exit_difficulty",
        // [resolver]
        "resolver",
        "resolver.max_actions_per_corner",
        "resolver.max_corners_per_lap",
        // [language]
        "language",
        "language.locale",
        // [performance]
        "performance",
        "performance.latency_budget_ms",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// A table `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = join_key(prefix, k);
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Dotted paths of every float leaf that is NaN or infinite.
pub fn non_finite_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = join_key(prefix, k);
            match v {
                toml::Value::Float(f) if !f.is_finite() => keys.push(path),
                toml::Value::Table(_) => keys.extend(non_finite_keys(v, &path)),
                _ => {}
            }
        }
    }
    keys
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any. Ties resolve alphabetically.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut candidates: Vec<&str> = known.iter().copied().collect();
    candidates.sort_unstable();
    candidates
        .into_iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by_key(|&(_, dist)| dist)
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse raw TOML and return a warning for every unknown config key.
///
/// Never fails: parse errors are reported later by serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Range Validation
// ============================================================================

/// Range checks on a parsed `CoachConfig`.
///
/// Returns (errors, warnings). Errors are impossible values that must prevent
/// startup; warnings are suspicious but usable.
pub fn validate_ranges(config: &super::CoachConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let a = &config.ampel;
    if a.min_confidence <= 0.0 || a.min_confidence > 1.0 {
        errors.push(format!(
            "ampel.min_confidence = {:.3} must lie in (0, 1]",
            a.min_confidence
        ));
    }
    if a.extreme_slip_ratio <= 0.0 || a.extreme_slip_angle <= 0.0 {
        errors.push("ampel.extreme_slip_ratio and ampel.extreme_slip_angle must be > 0".to_string());
    }

    let m = &config.markers;
    if !(0.0..=1.0).contains(&m.peak_min_brake) {
        errors.push(format!(
            "markers.peak_min_brake = {:.3} must lie in [0, 1] (brake pressure is normalized)",
            m.peak_min_brake
        ));
    }
    if m.opening_min_delta < 0.0 {
        errors.push(format!(
            "markers.opening_min_delta = {:.3} cannot be negative",
            m.opening_min_delta
        ));
    }
    if m.hysteresis_window > 30 {
        warnings.push(ValidationWarning {
            field: "markers.hysteresis_window".to_string(),
            message: format!(
                "markers.hysteresis_window = {} samples will delay every marker noticeably",
                m.hysteresis_window
            ),
            suggestion: None,
        });
    }

    // Slip ranges: game slip ratios rarely exceed 1, slip angles rarely exceed 0.5 rad
    let s = &config.slip;
    if s.ratio_range > 1.0 {
        warnings.push(ValidationWarning {
            field: "slip.ratio_range".to_string(),
            message: format!(
                "slip.ratio_range = {:.3} is outside typical range (0-1); longitudinal factor will rarely saturate",
                s.ratio_range
            ),
            suggestion: None,
        });
    }
    if s.angle_range > 0.5 {
        warnings.push(ValidationWarning {
            field: "slip.angle_range".to_string(),
            message: format!(
                "slip.angle_range = {:.3} rad is outside typical range (0-0.5)",
                s.angle_range
            ),
            suggestion: None,
        });
    }

    let st = &config.statistics;
    if st.min_samples_for_outliers < 3 {
        errors.push(format!(
            "statistics.min_samples_for_outliers = {} must be >= 3 (quartiles need spread)",
            st.min_samples_for_outliers
        ));
    }
    if st.consistency_drill_threshold < 1.0 {
        warnings.push(ValidationWarning {
            field: "statistics.consistency_drill_threshold".to_string(),
            message: format!(
                "statistics.consistency_drill_threshold = {:.2} routes drivers as consistent as the reference into drills",
                st.consistency_drill_threshold
            ),
            suggestion: None,
        });
    }

    let r = &config.ranking;
    if r.min_reference_quality < 0.0 || r.min_reference_quality > 1.0 {
        errors.push(format!(
            "ranking.min_reference_quality = {:.2} must lie in [0, 1]",
            r.min_reference_quality
        ));
    }
    if r.corner_history_laps < r.min_corner_samples {
        errors.push(format!(
            "ranking.corner_history_laps ({}) must be >= ranking.min_corner_samples ({})",
            r.corner_history_laps, r.min_corner_samples
        ));
    }
    if r.max_coaching_corners > r.max_ranked_corners {
        warnings.push(ValidationWarning {
            field: "ranking.max_coaching_corners".to_string(),
            message: format!(
                "ranking.max_coaching_corners ({}) exceeds ranking.max_ranked_corners ({}); only ranked corners can be selected",
                r.max_coaching_corners, r.max_ranked_corners
            ),
            suggestion: None,
        });
    }

    if config.performance.latency_budget_ms == 0 {
        errors.push("performance.latency_budget_ms must be > 0".to_string());
    } else if config.performance.latency_budget_ms > 1_000 {
        warnings.push(ValidationWarning {
            field: "performance.latency_budget_ms".to_string(),
            message: format!(
                "performance.latency_budget_ms = {} is longer than a typical corner",
                config.performance.latency_budget_ms
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoachConfig;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("ampel", "ampel"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("yelow_max", "yellow_max"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [ampel]
            [ampel.exit]
            green_max = 0.5
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"ampel".to_string()));
        assert!(keys.contains(&"ampel.exit".to_string()));
        assert!(keys.contains(&"ampel.exit.green_max".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[ampel.entry]
yelow_max = 0.8
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("yelow_max"));
        assert_eq!(warnings[0].suggestion.as_deref(), Some("ampel.entry.yellow_max"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[driver]
assist_filter = "abs_on"

[ampel.rotation]
green_max = 0.55

[statistics]
outlier_method = "z_score"

[language]
locale = "en"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_serialized_defaults_only_use_known_keys() {
        let toml_str = CoachConfig::default().to_toml().unwrap();
        let warnings = validate_unknown_keys(&toml_str);
        assert!(warnings.is_empty(), "Key list out of sync: {:?}", warnings);
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("zzzzzzzzzzzzzzzzzzzz", &known).is_none());
    }

    #[test]
    fn test_non_finite_keys_found() {
        let toml: toml::Value = r#"
            [slip]
            ratio_range = nan
            angle_range = 0.2
            [ampel.exit]
            green_max = inf
        "#
        .parse()
        .unwrap();
        let mut keys = non_finite_keys(&toml, "");
        keys.sort();
        assert_eq!(keys, vec!["ampel.exit.green_max", "slip.ratio_range"]);
    }

    #[test]
    fn test_range_defaults_clean() {
        let (errors, warnings) = validate_ranges(&CoachConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_range_history_shorter_than_minimum_samples() {
        let mut config = CoachConfig::default();
        config.ranking.corner_history_laps = 1;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("corner_history_laps")));
    }

    #[test]
    fn test_range_low_drill_threshold_warns() {
        let mut config = CoachConfig::default();
        config.statistics.consistency_drill_threshold = 0.5;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
