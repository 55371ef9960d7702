//! Decoded telemetry sample types
//!
//! One `TelemetrySample` is produced per decoded frame by the upstream
//! decoder. The core never parses wire bytes; it only consumes these records
//! in arrival order.

use serde::{Deserialize, Serialize};

/// Wheel index order used by every per-wheel array (RL, RR, FL, FR).
pub mod wheel {
    pub const REAR_LEFT: usize = 0;
    pub const REAR_RIGHT: usize = 1;
    pub const FRONT_LEFT: usize = 2;
    pub const FRONT_RIGHT: usize = 3;
    pub const COUNT: usize = 4;
}

/// Session-level context carried on every sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionContext {
    /// Unique id of the game session; a change means a new session
    pub session_uid: u64,
    /// Track identifier
    pub track_id: i32,
    /// Raw session type code from the game
    pub session_type: u8,
    /// Decoder-derived trial flag
    #[serde(default)]
    pub is_time_trial: bool,
    /// Session clock (s)
    pub session_time: f64,
}

/// Lap-level context carried on every sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LapContext {
    /// Current lap number (1-based)
    pub lap_number: u16,
    /// Distance into the current lap (m)
    pub lap_distance: f64,
    /// Elapsed time in the current lap (ms)
    #[serde(default)]
    pub current_lap_time_ms: u32,
    /// False once the lap has been invalidated (track limits, collision)
    pub is_valid: bool,
}

/// Driver inputs and car state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CarInputs {
    /// Speed (km/h)
    pub speed_kmh: f64,
    /// Throttle position 0.0-1.0
    pub throttle: f64,
    /// Steering -1.0 (full left) to 1.0 (full right)
    pub steer: f64,
    /// Brake pressure 0.0-1.0
    pub brake: f64,
    /// Gear (-1 reverse, 0 neutral)
    pub gear: i8,
    /// Engine RPM
    pub rpm: u16,
}

/// Per-wheel slip block (wheel order RL, RR, FL, FR).
///
/// Kept as vectors so that short or damaged frames survive decoding; the
/// slip calculator rejects anything that is not exactly four finite values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WheelSlip {
    pub slip_ratio: Vec<f64>,
    /// Slip angle (rad)
    pub slip_angle: Vec<f64>,
}

impl WheelSlip {
    pub fn new(slip_ratio: [f64; 4], slip_angle: [f64; 4]) -> Self {
        Self {
            slip_ratio: slip_ratio.to_vec(),
            slip_angle: slip_angle.to_vec(),
        }
    }
}

/// A single decoded telemetry frame for one car.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TelemetrySample {
    /// Sample time (session seconds); non-decreasing within a stream
    pub timestamp: f64,
    /// Index of the car this frame describes
    pub car_index: u8,
    /// Index of the locally controlled car (from the packet header)
    pub player_car_index: u8,
    pub session: SessionContext,
    pub lap: LapContext,
    pub inputs: CarInputs,
    #[serde(default)]
    pub slip: Option<WheelSlip>,
}

impl TelemetrySample {
    /// True when this frame describes the locally controlled car.
    pub fn is_player_car(&self) -> bool {
        self.car_index == self.player_car_index
    }
}
