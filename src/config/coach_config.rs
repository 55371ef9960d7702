//! Coach Configuration - Every pipeline threshold as an operator-tunable TOML value
//!
//! Each section struct implements `Default` with the calibrated values, so a
//! missing or partial file changes nothing that is not explicitly set.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::TurnPhase;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "APEX_COACH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "coach_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `CoachConfig::load()` which searches:
/// 1. `$APEX_COACH_CONFIG` env var
/// 2. `./coach_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoachConfig {
    /// Driver profile used to select matching references
    #[serde(default)]
    pub driver: DriverProfileConfig,

    /// Sample admission rules
    #[serde(default)]
    pub gating: GatingConfig,

    /// Marker detection thresholds
    #[serde(default)]
    pub markers: MarkerConfig,

    /// Slip normalization ranges
    #[serde(default)]
    pub slip: SlipConfig,

    /// Safety ampel thresholds
    #[serde(default)]
    pub ampel: AmpelConfig,

    /// Statistical reference modeling
    #[serde(default)]
    pub statistics: StatisticsConfig,

    /// Corner ranking and selection
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Candidate generation
    #[serde(default)]
    pub candidates: CandidateConfig,

    /// Conflict resolution and global caps
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// User-facing language
    #[serde(default)]
    pub language: LanguageConfig,

    /// Latency budget
    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl CoachConfig {
    /// Load configuration using the standard search order:
    /// 1. `$APEX_COACH_CONFIG` environment variable
    /// 2. `./coach_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        Self::load_with_source().0
    }

    /// Same as `load()`, also returning the file the config came from (if any)
    /// so the watcher knows what to poll.
    pub fn load_with_source() -> (Self, Option<PathBuf>) {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), locale = %config.language.locale, "Loaded coach config from {}", CONFIG_ENV_VAR);
                        return (config, Some(p));
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./coach_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(locale = %config.language.locale, "Loaded coach config from ./{}", LOCAL_CONFIG_FILE);
                    return (config, Some(local));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found - using built-in defaults", LOCAL_CONFIG_FILE);
        (Self::default(), None)
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Coach config saved");
        Ok(())
    }

    /// Validate every section for internal consistency.
    ///
    /// Rules:
    /// - Ampel thresholds: 0 < green_max < yellow_max <= 1 per phase
    /// - Windows, sample minimums and caps must be > 0
    /// - Fractions (difficulties, realization, discounts) must lie in [0, 1]
    /// - No NaN/Inf anywhere
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        for phase in TurnPhase::ALL {
            let t = self.ampel.thresholds(phase);
            Self::check_ampel_thresholds(t.green_max, t.yellow_max, phase.as_str(), &mut errors);
        }

        let m = &self.markers;
        if m.hysteresis_window == 0 {
            errors.push("markers.hysteresis_window must be >= 1".to_string());
        }
        Self::check_fraction(m.brake_threshold, "markers.brake_threshold", &mut errors);
        Self::check_fraction(m.throttle_threshold, "markers.throttle_threshold", &mut errors);

        if self.slip.ratio_range <= 0.0 {
            errors.push(format!(
                "slip.ratio_range = {:.3} must be > 0 (used as divisor)",
                self.slip.ratio_range
            ));
        }
        if self.slip.angle_range <= 0.0 {
            errors.push(format!(
                "slip.angle_range = {:.3} must be > 0 (used as divisor)",
                self.slip.angle_range
            ));
        }

        let s = &self.statistics;
        if s.outlier_iqr_factor <= 0.0 {
            errors.push("statistics.outlier_iqr_factor must be > 0".to_string());
        }
        if s.zscore_threshold <= 0.0 {
            errors.push("statistics.zscore_threshold must be > 0".to_string());
        }
        Self::check_fraction(s.improvement_realization, "statistics.improvement_realization", &mut errors);
        Self::check_fraction(s.difficulty_discount, "statistics.difficulty_discount", &mut errors);

        let c = &self.candidates;
        for (name, v) in [
            ("candidates.entry_difficulty", c.entry_difficulty),
            ("candidates.rotation_difficulty", c.rotation_difficulty),
            ("candidates.exit_difficulty", c.exit_difficulty),
        ] {
            Self::check_fraction(v, name, &mut errors);
        }

        for (name, v) in [
            ("ranking.max_ranked_corners", self.ranking.max_ranked_corners),
            ("ranking.max_coaching_corners", self.ranking.max_coaching_corners),
            ("ranking.min_corner_samples", self.ranking.min_corner_samples),
            ("candidates.max_per_corner", c.max_per_corner),
            ("candidates.max_per_phase", c.max_per_phase),
            ("resolver.max_actions_per_corner", self.resolver.max_actions_per_corner),
            ("resolver.max_corners_per_lap", self.resolver.max_corners_per_lap),
        ] {
            if v == 0 {
                errors.push(format!("{name} must be >= 1"));
            }
        }

        let (range_errors, range_warnings) = super::validation::validate_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        // Reject NaN/Inf in any config value
        if let Ok(value) = toml::Value::try_from(self) {
            for key in super::validation::non_finite_keys(&value, "") {
                errors.push(format!("{key}: value must be a finite number"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_ampel_thresholds(green_max: f64, yellow_max: f64, phase: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass - catch them explicitly
        if !green_max.is_finite() || !yellow_max.is_finite() {
            errors.push(format!(
                "ampel.{phase}: values must be finite (got green_max={green_max}, yellow_max={yellow_max})"
            ));
            return;
        }
        if green_max <= 0.0 || yellow_max > 1.0 {
            errors.push(format!(
                "ampel.{phase}: thresholds must lie in (0, 1] (got green_max={green_max:.3}, yellow_max={yellow_max:.3})"
            ));
        }
        if yellow_max <= green_max {
            errors.push(format!(
                "ampel.{phase}: yellow_max ({yellow_max:.3}) must be > green_max ({green_max:.3})"
            ));
        }
    }

    fn check_fraction(value: f64, name: &str, errors: &mut Vec<String>) {
        if !(0.0..=1.0).contains(&value) {
            errors.push(format!("{name} = {value} must lie in [0, 1]"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Driver Profile
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverProfileConfig {
    /// Assist configuration used to pick matching references
    #[serde(default = "default_assist_filter")]
    pub assist_filter: String,
    /// Input device used to pick matching references
    #[serde(default = "default_device_filter")]
    pub device_filter: String,
}

fn default_assist_filter() -> String { "default".to_string() }
fn default_device_filter() -> String { "wheel".to_string() }

impl Default for DriverProfileConfig {
    fn default() -> Self {
        Self {
            assist_filter: default_assist_filter(),
            device_filter: default_device_filter(),
        }
    }
}

// ============================================================================
// Gating
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatingConfig {
    /// Session type code of the single-driver time trial mode
    #[serde(default = "default_time_trial_session_type")]
    pub time_trial_session_type: u8,
}

fn default_time_trial_session_type() -> u8 { 12 }

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            time_trial_session_type: default_time_trial_session_type(),
        }
    }
}

// ============================================================================
// Marker Detection
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkerConfig {
    /// Filtered brake pressure above which the driver is braking
    #[serde(default = "default_pedal_threshold")]
    pub brake_threshold: f64,
    /// Filtered throttle above which the driver is on throttle
    #[serde(default = "default_pedal_threshold")]
    pub throttle_threshold: f64,
    /// Samples averaged to suppress single-frame jitter
    #[serde(default = "default_hysteresis_window")]
    pub hysteresis_window: usize,
    /// Raw brake pressure a peak must exceed (0 disables the gate)
    #[serde(default = "default_peak_min_brake")]
    pub peak_min_brake: f64,
    /// Minimum frame-to-frame throttle rise for an opening marker on top of
    /// strictly exceeding the prior window values
    #[serde(default = "default_opening_min_delta")]
    pub opening_min_delta: f64,
}

fn default_pedal_threshold() -> f64 { 0.1 }
fn default_hysteresis_window() -> usize { 3 }
fn default_peak_min_brake() -> f64 { 0.0 }
fn default_opening_min_delta() -> f64 { 0.0 }

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            brake_threshold: default_pedal_threshold(),
            throttle_threshold: default_pedal_threshold(),
            hysteresis_window: default_hysteresis_window(),
            peak_min_brake: default_peak_min_brake(),
            opening_min_delta: default_opening_min_delta(),
        }
    }
}

// ============================================================================
// Slip
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlipConfig {
    /// Slip ratio treated as full longitudinal utilization
    #[serde(default = "default_ratio_range")]
    pub ratio_range: f64,
    /// Slip angle (rad) treated as full lateral utilization
    #[serde(default = "default_angle_range")]
    pub angle_range: f64,
    /// Rear slip ratio above which the rear wheels are spinning
    #[serde(default = "default_wheelspin_slip_ratio")]
    pub wheelspin_slip_ratio: f64,
    /// Front/rear slip-angle difference (rad) flagging under/oversteer
    #[serde(default = "default_balance_slip_angle")]
    pub balance_slip_angle: f64,
}

fn default_ratio_range() -> f64 { 0.3 }
fn default_angle_range() -> f64 { 0.2 }
fn default_wheelspin_slip_ratio() -> f64 { 0.15 }
fn default_balance_slip_angle() -> f64 { 0.05 }

impl Default for SlipConfig {
    fn default() -> Self {
        Self {
            ratio_range: default_ratio_range(),
            angle_range: default_angle_range(),
            wheelspin_slip_ratio: default_wheelspin_slip_ratio(),
            balance_slip_angle: default_balance_slip_angle(),
        }
    }
}

// ============================================================================
// Ampel
// ============================================================================

/// Color cutoffs for one phase. A factor equal to a cutoff takes the lower color.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PhaseThresholds {
    #[serde(default = "default_green_max")]
    pub green_max: f64,
    #[serde(default = "default_yellow_max")]
    pub yellow_max: f64,
}

fn default_green_max() -> f64 { 0.6 }
fn default_yellow_max() -> f64 { 0.85 }

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            green_max: default_green_max(),
            yellow_max: default_yellow_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmpelConfig {
    #[serde(default)]
    pub entry: PhaseThresholds,
    #[serde(default)]
    pub rotation: PhaseThresholds,
    #[serde(default)]
    pub exit: PhaseThresholds,
    /// Slip ratio beyond which readings are suspected sensor noise
    #[serde(default = "default_extreme_slip_ratio")]
    pub extreme_slip_ratio: f64,
    /// Slip angle (rad) beyond which readings are suspected sensor noise
    #[serde(default = "default_extreme_slip_angle")]
    pub extreme_slip_angle: f64,
    /// Combined factor below which low-speed readings are unreliable
    #[serde(default = "default_low_slip_combined")]
    pub low_slip_combined: f64,
    /// Confidence floor
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_extreme_slip_ratio() -> f64 { 1.0 }
fn default_extreme_slip_angle() -> f64 { 0.5 }
fn default_low_slip_combined() -> f64 { 0.05 }
fn default_min_confidence() -> f64 { 0.1 }

impl AmpelConfig {
    pub fn thresholds(&self, phase: TurnPhase) -> &PhaseThresholds {
        match phase {
            TurnPhase::Entry => &self.entry,
            TurnPhase::Rotation => &self.rotation,
            TurnPhase::Exit => &self.exit,
        }
    }
}

impl Default for AmpelConfig {
    fn default() -> Self {
        Self {
            entry: PhaseThresholds::default(),
            rotation: PhaseThresholds::default(),
            exit: PhaseThresholds::default(),
            extreme_slip_ratio: default_extreme_slip_ratio(),
            extreme_slip_angle: default_extreme_slip_angle(),
            low_slip_combined: default_low_slip_combined(),
            min_confidence: default_min_confidence(),
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Outlier rejection method.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Tukey fences around the interquartile range
    #[default]
    Iqr,
    /// Distance from the mean in population standard deviations
    ZScore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsConfig {
    #[serde(default)]
    pub outlier_method: OutlierMethod,
    /// Fence width in IQR units
    #[serde(default = "default_outlier_iqr_factor")]
    pub outlier_iqr_factor: f64,
    /// Below this many samples no values are rejected
    #[serde(default = "default_min_samples_for_outliers")]
    pub min_samples_for_outliers: usize,
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: f64,
    /// Consistency score above which a corner gets a consistency drill
    #[serde(default = "default_consistency_drill_threshold")]
    pub consistency_drill_threshold: f64,
    /// Share of the measured deficit considered realizable in one step
    #[serde(default = "default_improvement_realization")]
    pub improvement_realization: f64,
    /// How strongly difficulty discounts the realizable gain
    #[serde(default = "default_difficulty_discount")]
    pub difficulty_discount: f64,
    /// Laps required before a performance mode is reported
    #[serde(default = "default_performance_mode_min_samples")]
    pub performance_mode_min_samples: usize,
}

fn default_outlier_iqr_factor() -> f64 { 1.5 }
fn default_min_samples_for_outliers() -> usize { 4 }
fn default_zscore_threshold() -> f64 { 2.5 }
fn default_consistency_drill_threshold() -> f64 { 2.0 }
fn default_improvement_realization() -> f64 { 0.3 }
fn default_difficulty_discount() -> f64 { 0.7 }
fn default_performance_mode_min_samples() -> usize { 5 }

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            outlier_method: OutlierMethod::default(),
            outlier_iqr_factor: default_outlier_iqr_factor(),
            min_samples_for_outliers: default_min_samples_for_outliers(),
            zscore_threshold: default_zscore_threshold(),
            consistency_drill_threshold: default_consistency_drill_threshold(),
            improvement_realization: default_improvement_realization(),
            difficulty_discount: default_difficulty_discount(),
            performance_mode_min_samples: default_performance_mode_min_samples(),
        }
    }
}

// ============================================================================
// Ranking
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingConfig {
    /// Corners kept after impact ranking
    #[serde(default = "default_max_ranked_corners")]
    pub max_ranked_corners: usize,
    /// Corners selected for coaching per lap
    #[serde(default = "default_max_coaching_corners")]
    pub max_coaching_corners: usize,
    /// Minimum driver samples per corner before it is ranked
    #[serde(default = "default_min_corner_samples")]
    pub min_corner_samples: usize,
    /// References below this quality score are ignored (0 disables the filter)
    #[serde(default)]
    pub min_reference_quality: f64,
    /// Laps of corner times kept per corner
    #[serde(default = "default_corner_history_laps")]
    pub corner_history_laps: usize,
}

fn default_max_ranked_corners() -> usize { 5 }
fn default_max_coaching_corners() -> usize { 3 }
fn default_min_corner_samples() -> usize { 2 }
fn default_corner_history_laps() -> usize { 20 }

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_ranked_corners: default_max_ranked_corners(),
            max_coaching_corners: default_max_coaching_corners(),
            min_corner_samples: default_min_corner_samples(),
            min_reference_quality: 0.0,
            corner_history_laps: default_corner_history_laps(),
        }
    }
}

// ============================================================================
// Candidates
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateConfig {
    #[serde(default = "default_max_per_corner")]
    pub max_per_corner: usize,
    #[serde(default = "default_max_per_phase")]
    pub max_per_phase: usize,
    /// Difficulty of Entry changes, discounts expected gain
    #[serde(default = "default_entry_difficulty")]
    pub entry_difficulty: f64,
    #[serde(default = "default_rotation_difficulty")]
    pub rotation_difficulty: f64,
    #[serde(default = "default_exit_difficulty")]
    pub exit_difficulty: f64,
}

fn default_max_per_corner() -> usize { 3 }
fn default_max_per_phase() -> usize { 1 }
fn default_entry_difficulty() -> f64 { 0.4 }
fn default_rotation_difficulty() -> f64 { 0.5 }
fn default_exit_difficulty() -> f64 { 0.6 }

impl CandidateConfig {
    pub fn difficulty(&self, phase: TurnPhase) -> f64 {
        match phase {
            TurnPhase::Entry => self.entry_difficulty,
            TurnPhase::Rotation => self.rotation_difficulty,
            TurnPhase::Exit => self.exit_difficulty,
        }
    }
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            max_per_corner: default_max_per_corner(),
            max_per_phase: default_max_per_phase(),
            entry_difficulty: default_entry_difficulty(),
            rotation_difficulty: default_rotation_difficulty(),
            exit_difficulty: default_exit_difficulty(),
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    #[serde(default = "default_max_actions_per_corner")]
    pub max_actions_per_corner: usize,
    #[serde(default = "default_max_corners_per_lap")]
    pub max_corners_per_lap: usize,
}

fn default_max_actions_per_corner() -> usize { 1 }
fn default_max_corners_per_lap() -> usize { 3 }

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_actions_per_corner: default_max_actions_per_corner(),
            max_corners_per_lap: default_max_corners_per_lap(),
        }
    }
}

// ============================================================================
// Language
// ============================================================================

/// Language of the generated coaching text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    De,
    En,
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locale::De => write!(f, "de"),
            Locale::En => write!(f, "en"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LanguageConfig {
    #[serde(default)]
    pub locale: Locale,
}

// ============================================================================
// Performance
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceConfig {
    /// Soft budget from lap completion to selected actions (ms)
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
}

fn default_latency_budget_ms() -> u64 { 150 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: default_latency_budget_ms(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = CoachConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: CoachConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.gating.time_trial_session_type, 12);
        assert_eq!(config.markers.hysteresis_window, 3);
        assert_eq!(config.ampel.entry.green_max, 0.6);
        assert_eq!(config.ampel.exit.yellow_max, 0.85);
        assert_eq!(config.statistics.consistency_drill_threshold, 2.0);
        assert_eq!(config.resolver.max_corners_per_lap, 3);
        assert_eq!(config.language.locale, Locale::De);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[ampel.exit]
green_max = 0.5
yellow_max = 0.75

[language]
locale = "en"
"#;
        let config: CoachConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.ampel.exit.green_max, 0.5);
        assert_eq!(config.ampel.exit.yellow_max, 0.75);
        assert_eq!(config.language.locale, Locale::En);
        // Non-overridden values retain defaults
        assert_eq!(config.ampel.entry.green_max, 0.6);
        assert_eq!(config.candidates.exit_difficulty, 0.6);
    }

    #[test]
    fn test_validation_catches_inverted_ampel_thresholds() {
        let mut config = CoachConfig::default();
        config.ampel.rotation.green_max = 0.9;
        config.ampel.rotation.yellow_max = 0.7;
        let result = config.validate();
        assert!(result.is_err(), "Inverted thresholds should fail validation");
        if let Err(ConfigError::Validation(errors)) = result {
            assert!(errors.iter().any(|e| e.contains("ampel.rotation")));
        }
    }

    #[test]
    fn test_validation_catches_zero_caps() {
        let mut config = CoachConfig::default();
        config.resolver.max_corners_per_lap = 0;
        config.markers.hysteresis_window = 0;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("zero caps should fail validation");
        };
        assert!(errors.iter().any(|e| e.contains("max_corners_per_lap")));
        assert!(errors.iter().any(|e| e.contains("hysteresis_window")));
    }

    #[test]
    fn test_validation_catches_nan() {
        let mut config = CoachConfig::default();
        config.slip.wheelspin_slip_ratio = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = CoachConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped = CoachConfig::from_toml_str(&toml_str).expect("deserialization should work");
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn test_load_from_file_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[ampel.entry\ngreen_max = ").expect("write");
        let err = CoachConfig::load_from_file(&path).expect_err("broken TOML must fail");
        assert!(err.to_string().contains("broken.toml"));
    }
}
