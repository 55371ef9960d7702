//! Synthetic time-trial laps for replay, demos and end-to-end tests
//!
//! Each corner is driven as straight → braking → coasting → throttle ramp.
//! Timing noise, a deliberately slow corner, tyre slip level and invalid laps
//! are configurable so every branch of the coaching pipeline can be reached
//! without a game running.

use anyhow::{anyhow, Result};
use chrono::Utc;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use crate::types::{
    CarInputs, CornerReference, LapContext, SessionContext, TelemetrySample, WheelSlip,
};

/// Session type the game reports for time trial.
const TIME_TRIAL_SESSION_TYPE: u8 = 12;

/// Throttle steps after the apex; opening fires on the third.
const EXIT_RAMP: [f64; 4] = [0.25, 0.5, 0.75, 1.0];

/// Brake pressure held through the braking zone.
const BRAKE_PRESSURE: f64 = 0.9;

/// Reference drivers are this much quicker than a clean simulated lap.
const REFERENCE_PACE: f64 = 0.98;

/// Reference spread as a share of the median.
const REFERENCE_SPREAD: f64 = 0.015;

/// Shape of one corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerProfile {
    pub entry_speed_kmh: f64,
    pub apex_speed_kmh: f64,
    pub straight_s: f64,
    pub brake_s: f64,
    pub coast_s: f64,
}

/// A five-corner club circuit.
pub const DEFAULT_TRACK: [CornerProfile; 5] = [
    CornerProfile { entry_speed_kmh: 290.0, apex_speed_kmh: 85.0, straight_s: 6.0, brake_s: 1.8, coast_s: 0.8 },
    CornerProfile { entry_speed_kmh: 240.0, apex_speed_kmh: 140.0, straight_s: 3.5, brake_s: 1.0, coast_s: 1.2 },
    CornerProfile { entry_speed_kmh: 270.0, apex_speed_kmh: 110.0, straight_s: 4.5, brake_s: 1.4, coast_s: 1.0 },
    CornerProfile { entry_speed_kmh: 210.0, apex_speed_kmh: 160.0, straight_s: 2.5, brake_s: 0.6, coast_s: 1.5 },
    CornerProfile { entry_speed_kmh: 300.0, apex_speed_kmh: 70.0, straight_s: 7.0, brake_s: 2.0, coast_s: 0.6 },
];

#[derive(Debug, Clone)]
pub struct SimulationParams {
    /// Random seed for reproducible runs
    pub seed: Option<u64>,
    pub laps: u16,
    pub sample_rate_hz: f64,
    /// Std-dev of per-phase timing as a share of the nominal duration
    pub timing_noise: f64,
    /// Tyre slip level 0.0-1.0; above ~0.85 braking and traction turn red
    pub slip_level: f64,
    /// (corner ordinal, extra time share) for one corner driven too slowly
    pub slow_corner: Option<(u32, f64)>,
    /// Laps reported as invalid (e.g. track limits)
    pub invalid_laps: Vec<u16>,
    pub session_uid: u64,
    pub track_id: i32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            seed: None,
            laps: 5,
            sample_rate_hz: 20.0,
            timing_noise: 0.005,
            slip_level: 0.3,
            slow_corner: None,
            invalid_laps: Vec::new(),
            session_uid: 1,
            track_id: 0,
        }
    }
}

/// Generates a stream of time-trial samples for the player car.
pub struct LapSimulator {
    params: SimulationParams,
    track: Vec<CornerProfile>,
    rng: StdRng,
    timing: Normal<f64>,
    jitter: Normal<f64>,
    dt: f64,
    t: f64,
    lap: u16,
    lap_elapsed: f64,
    lap_valid: bool,
    speed: f64,
    samples_generated: u64,
}

impl LapSimulator {
    pub fn new(params: SimulationParams) -> Result<Self> {
        Self::with_track(params, DEFAULT_TRACK.to_vec())
    }

    pub fn with_track(params: SimulationParams, track: Vec<CornerProfile>) -> Result<Self> {
        if track.is_empty() {
            return Err(anyhow!("track needs at least one corner"));
        }
        if !(params.sample_rate_hz > 0.0) {
            return Err(anyhow!("sample rate must be positive, got {}", params.sample_rate_hz));
        }
        let timing = Normal::new(0.0, params.timing_noise)
            .map_err(|e| anyhow!("invalid timing noise {}: {e}", params.timing_noise))?;
        let jitter = Normal::new(0.0, 0.01).map_err(|e| anyhow!("invalid input jitter: {e}"))?;
        let rng = match params.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let speed = track.last().map_or(200.0, |c| c.apex_speed_kmh);
        Ok(Self {
            dt: 1.0 / params.sample_rate_hz,
            params,
            track,
            rng,
            timing,
            jitter,
            t: 0.0,
            lap: 0,
            lap_elapsed: 0.0,
            lap_valid: true,
            speed,
            samples_generated: 0,
        })
    }

    /// All laps plus the first sample of the following lap, which closes the last one.
    pub fn generate_session(&mut self) -> Vec<TelemetrySample> {
        let mut samples = Vec::new();
        for _ in 0..self.params.laps {
            samples.extend(self.generate_lap());
        }
        samples.push(self.closing_sample());
        samples
    }

    /// Drive one full lap.
    pub fn generate_lap(&mut self) -> Vec<TelemetrySample> {
        self.start_lap();
        let track = self.track.clone();
        let mut out = Vec::new();
        for (i, corner) in track.iter().enumerate() {
            let extra = match self.params.slow_corner {
                Some((ordinal, share)) if ordinal as usize == i + 1 => share,
                _ => 0.0,
            };
            self.drive_corner(corner, extra, &mut out);
        }
        out
    }

    /// One straight-line sample on the next lap.
    pub fn closing_sample(&mut self) -> TelemetrySample {
        self.start_lap();
        let speed = self.speed;
        self.emit(0.0, 1.0, speed, [0.0; 4], [0.0; 4])
    }

    fn start_lap(&mut self) {
        self.lap += 1;
        self.lap_elapsed = 0.0;
        self.lap_valid = !self.params.invalid_laps.contains(&self.lap);
    }

    fn drive_corner(&mut self, corner: &CornerProfile, extra: f64, out: &mut Vec<TelemetrySample>) {
        let slip = self.params.slip_level;

        // Straight: accelerate to the braking point
        let n = self.samples(corner.straight_s).max(1);
        let from = self.speed;
        for k in 1..=n {
            let speed = lerp(from, corner.entry_speed_kmh, k as f64 / n as f64);
            let sample = self.emit(0.0, 1.0, speed, [0.02 * slip; 4], [0.01 * slip; 4]);
            out.push(sample);
        }

        // Braking: front axle carries the load
        let n = self.noisy_samples(corner.brake_s, extra).max(3);
        for k in 1..=n {
            let speed = lerp(corner.entry_speed_kmh, corner.apex_speed_kmh, k as f64 / n as f64);
            let brake = (BRAKE_PRESSURE + self.jitter.sample(&mut self.rng)).clamp(0.5, 1.0);
            let front_ratio = -0.15 * slip;
            let front_angle = 0.2 * slip;
            let sample = self.emit(
                brake,
                0.0,
                speed,
                [-0.05 * slip, -0.05 * slip, front_ratio, front_ratio],
                [0.05 * slip, 0.05 * slip, front_angle, front_angle],
            );
            out.push(sample);
        }

        // Coasting through the apex
        let n = self.noisy_samples(corner.coast_s, extra).max(1);
        for _ in 0..n {
            let sample = self.emit(0.0, 0.0, corner.apex_speed_kmh, [0.0; 4], [0.12 * slip; 4]);
            out.push(sample);
        }

        // Throttle ramp: rear axle under traction
        for (k, throttle) in EXIT_RAMP.iter().enumerate() {
            let speed = corner.apex_speed_kmh + 5.0 * (k + 1) as f64;
            let rear_ratio = 0.3 * slip * throttle;
            let sample = self.emit(
                0.0,
                *throttle,
                speed,
                [rear_ratio, rear_ratio, 0.02 * slip, 0.02 * slip],
                [0.08 * slip, 0.08 * slip, 0.05 * slip, 0.05 * slip],
            );
            out.push(sample);
        }
    }

    fn emit(&mut self, brake: f64, throttle: f64, speed: f64, ratio: [f64; 4], angle: [f64; 4]) -> TelemetrySample {
        self.t += self.dt;
        self.lap_elapsed += self.dt;
        self.speed = speed;
        self.samples_generated += 1;
        TelemetrySample {
            timestamp: self.t,
            car_index: 0,
            player_car_index: 0,
            session: SessionContext {
                session_uid: self.params.session_uid,
                track_id: self.params.track_id,
                session_type: TIME_TRIAL_SESSION_TYPE,
                is_time_trial: true,
                session_time: self.t,
            },
            lap: LapContext {
                lap_number: self.lap,
                lap_distance: self.lap_elapsed * speed / 3.6,
                current_lap_time_ms: (self.lap_elapsed * 1000.0).round() as u32,
                is_valid: self.lap_valid,
            },
            inputs: CarInputs {
                speed_kmh: speed,
                throttle,
                steer: 0.0,
                brake,
                gear: gear_for(speed),
                rpm: 11_000,
            },
            slip: Some(WheelSlip::new(ratio, angle)),
        }
    }

    fn samples(&self, seconds: f64) -> usize {
        (seconds * self.params.sample_rate_hz).round() as usize
    }

    fn noisy_samples(&mut self, seconds: f64, extra: f64) -> usize {
        let factor = (1.0 + extra + self.timing.sample(&mut self.rng)).max(0.1);
        self.samples(seconds * factor)
    }

    /// Corner references a slightly quicker driver would have produced on this track.
    pub fn reference_corners(&self) -> Vec<CornerReference> {
        let now = Utc::now();
        self.track
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let samples = self.samples(corner.brake_s).max(3) + self.samples(corner.coast_s).max(1) + 2;
                let median = samples as f64 * self.dt * 1000.0 * REFERENCE_PACE;
                let iqr = median * REFERENCE_SPREAD;
                CornerReference {
                    corner_id: i as u32 + 1,
                    median_time_ms: median,
                    q1_ms: median - iqr / 2.0,
                    q3_ms: median + iqr / 2.0,
                    iqr_ms: iqr,
                    sample_count: 60,
                    last_updated: now,
                    assist_filter: String::new(),
                    device_filter: String::new(),
                    preferred_line: None,
                }
            })
            .collect()
    }

    pub fn corner_count(&self) -> usize {
        self.track.len()
    }

    pub fn samples_generated(&self) -> u64 {
        self.samples_generated
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }
}

fn lerp(from: f64, to: f64, fraction: f64) -> f64 {
    from + (to - from) * fraction
}

fn gear_for(speed_kmh: f64) -> i8 {
    match speed_kmh {
        s if s < 80.0 => 2,
        s if s < 120.0 => 3,
        s if s < 160.0 => 4,
        s if s < 200.0 => 5,
        s if s < 250.0 => 6,
        s if s < 290.0 => 7,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator(params: SimulationParams) -> LapSimulator {
        LapSimulator::new(SimulationParams { seed: Some(7), ..params }).unwrap()
    }

    #[test]
    fn test_session_closes_last_lap() {
        let mut sim = simulator(SimulationParams { laps: 3, ..Default::default() });
        let samples = sim.generate_session();
        assert_eq!(samples.first().unwrap().lap.lap_number, 1);
        assert_eq!(samples.last().unwrap().lap.lap_number, 4);
        assert_eq!(sim.samples_generated(), samples.len() as u64);
        assert!(samples.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }

    #[test]
    fn test_lap_time_restarts_each_lap() {
        let mut sim = simulator(SimulationParams::default());
        let lap1 = sim.generate_lap();
        let lap2 = sim.generate_lap();
        assert!(lap1.last().unwrap().lap.current_lap_time_ms > 20_000);
        assert_eq!(lap2[0].lap.current_lap_time_ms, 50);
    }

    #[test]
    fn test_invalid_laps_flagged() {
        let mut sim = simulator(SimulationParams {
            invalid_laps: vec![2],
            ..Default::default()
        });
        assert!(sim.generate_lap().iter().all(|s| s.lap.is_valid));
        assert!(sim.generate_lap().iter().all(|s| !s.lap.is_valid));
    }

    #[test]
    fn test_slow_corner_takes_longer() {
        let clean = simulator(SimulationParams { timing_noise: 0.0, ..Default::default() })
            .generate_lap()
            .len();
        let slow = simulator(SimulationParams {
            timing_noise: 0.0,
            slow_corner: Some((2, 0.5)),
            ..Default::default()
        })
        .generate_lap()
        .len();
        assert!(slow > clean);
    }

    #[test]
    fn test_reference_per_corner() {
        let sim = simulator(SimulationParams::default());
        let refs = sim.reference_corners();
        assert_eq!(refs.len(), sim.corner_count());
        assert_eq!(refs[0].corner_id, 1);
        let ratio = refs[0].iqr_ms / refs[0].median_time_ms;
        assert!((0.01..=0.2).contains(&ratio));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(LapSimulator::new(SimulationParams { timing_noise: -1.0, ..Default::default() }).is_err());
        assert!(LapSimulator::new(SimulationParams { sample_rate_hz: 0.0, ..Default::default() }).is_err());
        assert!(LapSimulator::with_track(SimulationParams::default(), Vec::new()).is_err());
    }
}
