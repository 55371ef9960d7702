//! System-wide default constants.
//!
//! Values that are not operator-tunable, grouped by subsystem.

// ============================================================================
// Config Watcher
// ============================================================================

/// Interval between config file mtime checks (seconds).
pub const CONFIG_POLL_INTERVAL_SECS: u64 = 2;

/// Delay after a detected change before reloading (ms). Editors write in stages.
pub const CONFIG_DEBOUNCE_MS: u64 = 500;

// ============================================================================
// Pipeline
// ============================================================================

/// Capacity of the channel between the ingestion task and the analysis worker (laps).
pub const ANALYSIS_CHANNEL_CAPACITY: usize = 8;

/// Completed laps of lap times kept for performance-mode detection.
pub const LAP_TIME_HISTORY: usize = 50;

/// Emit a gating summary every this many samples.
pub const GATING_SUMMARY_INTERVAL: u64 = 10_000;

// ============================================================================
// Candidates
// ============================================================================

/// Confidence of a consistency-drill candidate.
pub const CONSISTENCY_DRILL_CONFIDENCE: f64 = 0.9;

/// Priority of a consistency-drill candidate; outranks any pace candidate with impact below 1.
pub const CONSISTENCY_DRILL_PRIORITY: f64 = 1.0;

// ============================================================================
// Presentation
// ============================================================================

/// Below this confidence a recommendation is marked "try carefully".
pub const LOW_CONFIDENCE_NOTE_BELOW: f64 = 0.7;

// ============================================================================
// Reference Quality
// ============================================================================

/// Sample count at which a reference reaches full sample-size credit.
pub const REFERENCE_FULL_SAMPLE_COUNT: f64 = 50.0;

/// Age (days) at which recency credit bottoms out.
pub const REFERENCE_STALE_AFTER_DAYS: f64 = 30.0;

/// Recency credit floor.
pub const REFERENCE_MIN_RECENCY: f64 = 0.2;

// ============================================================================
// Performance Mode
// ============================================================================

/// Lap-time IQR / median below which a driver counts as consistent.
pub const CONSISTENT_SPREAD_RATIO: f64 = 0.02;

/// Fastest-decile advantage over the median above which a driver counts as fast.
pub const FAST_LAP_ADVANTAGE_RATIO: f64 = 0.01;

// ============================================================================
// Simulation
// ============================================================================

/// Base delay per sample at 1x replay speed (ms); 60 Hz telemetry.
pub const SIMULATION_BASE_DELAY_MS: u64 = 16;
