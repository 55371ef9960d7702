//! Turn phases, driving-input markers and completed turn segments

use serde::{Deserialize, Serialize};

use super::SlipMetrics;

// ============================================================================
// Turn Phase
// ============================================================================

/// Phase of a corner.
///
/// Declaration order is the coaching priority order: Entry work is preferred
/// over Rotation work, which is preferred over Exit work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Braking and turn-in
    Entry,
    /// Mid-corner direction change
    Rotation,
    /// Throttle application
    Exit,
}

impl TurnPhase {
    /// All phases in coaching priority order.
    pub const ALL: [TurnPhase; 3] = [TurnPhase::Entry, TurnPhase::Rotation, TurnPhase::Exit];

    pub fn short_code(&self) -> &'static str {
        match self {
            TurnPhase::Entry => "ENT",
            TurnPhase::Rotation => "ROT",
            TurnPhase::Exit => "EXT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Entry => "entry",
            TurnPhase::Rotation => "rotation",
            TurnPhase::Exit => "exit",
        }
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnPhase::Entry => write!(f, "Entry"),
            TurnPhase::Rotation => write!(f, "Rotation"),
            TurnPhase::Exit => write!(f, "Exit"),
        }
    }
}

// ============================================================================
// Markers
// ============================================================================

/// Driving-input event detected on a single sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    BrakeStart,
    BrakePeak,
    BrakeRelease,
    ThrottlePickup,
    ThrottleRelease,
    ThrottleOpening,
    /// Local speed minimum, used as an apex proxy
    SpeedMinimum,
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarkerKind::BrakeStart => "brake_start",
            MarkerKind::BrakePeak => "brake_peak",
            MarkerKind::BrakeRelease => "brake_release",
            MarkerKind::ThrottlePickup => "throttle_pickup",
            MarkerKind::ThrottleRelease => "throttle_release",
            MarkerKind::ThrottleOpening => "throttle_opening",
            MarkerKind::SpeedMinimum => "speed_minimum",
        };
        write!(f, "{s}")
    }
}

/// A typed marker with the raw signal value and car speed at detection time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// Sample timestamp (s)
    pub timestamp: f64,
    /// Raw channel value (brake/throttle 0-1, or speed for `SpeedMinimum`)
    pub value: f64,
    /// Car speed (km/h)
    pub speed_kmh: f64,
}

impl Marker {
    pub fn new(kind: MarkerKind, timestamp: f64, value: f64, speed_kmh: f64) -> Self {
        Self { kind, timestamp, value, speed_kmh }
    }
}

/// Markers collected while one corner is driven.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TurnMarkers {
    pub brake_start: Option<Marker>,
    pub brake_peak: Option<Marker>,
    pub brake_release: Option<Marker>,
    pub throttle_pickup: Option<Marker>,
    pub throttle_opening: Option<Marker>,
    /// Speed-minimum marker that served as apex proxy
    pub apex: Option<Marker>,
    pub entry_speed_kmh: Option<f64>,
    pub min_speed_kmh: Option<f64>,
    pub exit_speed_kmh: Option<f64>,
}

// ============================================================================
// Per-phase slip
// ============================================================================

/// Worst slip observed in each phase of a corner (by combined factor).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseSlip {
    pub entry: Option<SlipMetrics>,
    pub rotation: Option<SlipMetrics>,
    pub exit: Option<SlipMetrics>,
}

impl PhaseSlip {
    pub fn get(&self, phase: TurnPhase) -> Option<&SlipMetrics> {
        match phase {
            TurnPhase::Entry => self.entry.as_ref(),
            TurnPhase::Rotation => self.rotation.as_ref(),
            TurnPhase::Exit => self.exit.as_ref(),
        }
    }

    /// Keep `metrics` for `phase` if it is worse than what is already held.
    pub fn record(&mut self, phase: TurnPhase, metrics: SlipMetrics) {
        let slot = match phase {
            TurnPhase::Entry => &mut self.entry,
            TurnPhase::Rotation => &mut self.rotation,
            TurnPhase::Exit => &mut self.exit,
        };
        let worse = slot
            .as_ref()
            .map_or(true, |held| metrics.combined_slip_factor > held.combined_slip_factor);
        if worse {
            *slot = Some(metrics);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none() && self.rotation.is_none() && self.exit.is_none()
    }
}

// ============================================================================
// Turn Segment
// ============================================================================

/// One corner's lifecycle record, emitted when the Exit phase completes.
///
/// Durations are `None` whenever the marker they depend on was not observed;
/// such partial segments are still emitted and should be treated as lower
/// confidence downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnSegment {
    /// Stream-wide running turn counter
    pub turn_id: u64,
    /// Lap the corner was completed in (assigned by the stream context)
    pub lap_number: u16,
    /// 1-based corner ordinal within the lap (assigned by the stream context)
    pub corner_index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub phase: TurnPhase,
    pub markers: TurnMarkers,
    pub entry_ms: Option<f64>,
    pub rotation_ms: Option<f64>,
    pub exit_ms: Option<f64>,
    pub trail_braking_ms: Option<f64>,
    #[serde(default)]
    pub phase_slip: PhaseSlip,
}

impl TurnSegment {
    /// Total corner time from first brake application to throttle opening (ms).
    pub fn duration_ms(&self) -> f64 {
        (self.end_time - self.start_time) * 1000.0
    }

    /// True when any of the entry/rotation durations could not be derived.
    pub fn is_partial(&self) -> bool {
        self.entry_ms.is_none() || self.rotation_ms.is_none()
    }
}
