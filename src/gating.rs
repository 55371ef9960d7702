//! Sample gating: only time-trial, player-car, valid-lap samples reach analysis
//!
//! Rules run in a fixed order and the first failing rule claims the drop, so
//! every rejected sample increments exactly one drop counter.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GatingConfig;
use crate::types::{LapContext, SessionContext, TelemetrySample};

/// Why a sample was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRejection {
    NotTimeTrial,
    NotPlayerCar,
    InvalidLap,
}

/// Admission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatingMetrics {
    pub total_samples: u64,
    pub filtered_non_trial: u64,
    pub filtered_non_player: u64,
    pub filtered_invalid_lap: u64,
    pub passed_samples: u64,
}

impl GatingMetrics {
    /// Admitted share of all samples, in percent. 0.0 before the first sample.
    pub fn pass_rate(&self) -> f64 {
        if self.total_samples == 0 {
            return 0.0;
        }
        self.passed_samples as f64 / self.total_samples as f64 * 100.0
    }

    pub fn dropped_samples(&self) -> u64 {
        self.filtered_non_trial + self.filtered_non_player + self.filtered_invalid_lap
    }
}

impl std::fmt::Display for GatingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Gating: {}/{} passed ({:.1}%), dropped non-trial={} non-player={} invalid-lap={}",
            self.passed_samples,
            self.total_samples,
            self.pass_rate(),
            self.filtered_non_trial,
            self.filtered_non_player,
            self.filtered_invalid_lap
        )
    }
}

/// Stateful sample gate, one per stream.
#[derive(Debug, Clone)]
pub struct GatingService {
    time_trial_session_type: u8,
    /// Controlled-car index from the most recent packet header
    player_car_index: Option<u8>,
    metrics: GatingMetrics,
}

impl GatingService {
    pub fn new(config: &GatingConfig) -> Self {
        Self {
            time_trial_session_type: config.time_trial_session_type,
            player_car_index: None,
            metrics: GatingMetrics::default(),
        }
    }

    /// Track the controlled-car index announced by the packet header.
    pub fn track_player_car(&mut self, player_car_index: u8) {
        if self.player_car_index != Some(player_car_index) {
            debug!(player_car_index, "Tracking controlled car");
            self.player_car_index = Some(player_car_index);
        }
    }

    pub fn player_car_index(&self) -> Option<u8> {
        self.player_car_index
    }

    /// Decide whether a sample may enter analysis.
    ///
    /// Before any controlled car is tracked every sample fails the car rule.
    pub fn admit(&mut self, session: &SessionContext, lap: &LapContext, car_index: u8) -> bool {
        self.metrics.total_samples += 1;
        match self.check(session, lap, car_index) {
            Ok(()) => {
                self.metrics.passed_samples += 1;
                true
            }
            Err(reason) => {
                match reason {
                    GateRejection::NotTimeTrial => self.metrics.filtered_non_trial += 1,
                    GateRejection::NotPlayerCar => self.metrics.filtered_non_player += 1,
                    GateRejection::InvalidLap => self.metrics.filtered_invalid_lap += 1,
                }
                debug!(
                    ?reason,
                    session_type = session.session_type,
                    car_index,
                    lap = lap.lap_number,
                    "Sample rejected by gate"
                );
                false
            }
        }
    }

    /// Track the sample's header car index, then `admit` it.
    pub fn admit_sample(&mut self, sample: &TelemetrySample) -> bool {
        self.track_player_car(sample.player_car_index);
        self.admit(&sample.session, &sample.lap, sample.car_index)
    }

    fn check(&self, session: &SessionContext, lap: &LapContext, car_index: u8) -> Result<(), GateRejection> {
        if !self.is_time_trial(session) {
            return Err(GateRejection::NotTimeTrial);
        }
        if self.player_car_index != Some(car_index) {
            return Err(GateRejection::NotPlayerCar);
        }
        if !lap.is_valid {
            return Err(GateRejection::InvalidLap);
        }
        Ok(())
    }

    pub fn is_time_trial(&self, session: &SessionContext) -> bool {
        session.is_time_trial || session.session_type == self.time_trial_session_type
    }

    pub fn metrics(&self) -> GatingMetrics {
        self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = GatingMetrics::default();
    }
}
