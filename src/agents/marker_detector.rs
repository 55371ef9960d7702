//! Marker Detector - jitter-resilient driving-input events
//!
//! Each channel (brake, throttle, speed) keeps a short rolling history of
//! `2 x window` samples. Pedal state is decided on the windowed mean so a
//! single noisy frame cannot flip it; peak and opening events fire when the
//! raw value strictly exceeds every prior sample of the window.
//!
//! Per sample, markers are emitted in the order brake, throttle, speed.

use std::collections::VecDeque;
use tracing::debug;

use crate::config::MarkerConfig;
use crate::types::{CarInputs, Marker, MarkerKind};

/// Rolling history of one input channel.
#[derive(Debug, Clone)]
struct ChannelHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl ChannelHistory {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    /// Mean of the last `window` values, or `raw` while the history is shorter.
    fn filtered(&self, window: usize, raw: f64) -> f64 {
        if self.values.len() < window {
            return raw;
        }
        self.values.iter().rev().take(window).sum::<f64>() / window as f64
    }

    /// Up to `n` values preceding the most recent one, newest first.
    fn prior(&self, n: usize) -> impl Iterator<Item = &f64> {
        self.values.iter().rev().skip(1).take(n)
    }

    fn previous(&self) -> Option<f64> {
        self.prior(1).next().copied()
    }

    fn last_n(&self, n: usize) -> impl Iterator<Item = &f64> {
        self.values.iter().rev().take(n)
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// Detects brake, throttle and speed-minimum markers on a per-stream basis.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    config: MarkerConfig,
    brake: ChannelHistory,
    throttle: ChannelHistory,
    speed: ChannelHistory,
    was_braking: bool,
    was_throttling: bool,
}

/// Prior samples a peak or opening must exceed.
const PEAK_LOOKBACK: usize = 2;

impl MarkerDetector {
    pub fn new(config: &MarkerConfig) -> Self {
        let window = config.hysteresis_window.max(1);
        let capacity = window * 2;
        Self {
            config: MarkerConfig {
                hysteresis_window: window,
                ..config.clone()
            },
            brake: ChannelHistory::new(capacity),
            throttle: ChannelHistory::new(capacity),
            speed: ChannelHistory::new(capacity),
            was_braking: false,
            was_throttling: false,
        }
    }

    /// Feed one sample and return the markers it produced.
    pub fn detect(&mut self, inputs: &CarInputs, timestamp: f64) -> Vec<Marker> {
        self.brake.push(inputs.brake);
        self.throttle.push(inputs.throttle);
        self.speed.push(inputs.speed_kmh);

        let mut markers = Vec::with_capacity(2);
        if let Some(m) = self.detect_brake(inputs, timestamp) {
            markers.push(m);
        }
        if let Some(m) = self.detect_throttle(inputs, timestamp) {
            markers.push(m);
        }
        if let Some(m) = self.detect_speed_minimum(inputs, timestamp) {
            markers.push(m);
        }
        markers
    }

    fn detect_brake(&mut self, inputs: &CarInputs, timestamp: f64) -> Option<Marker> {
        let window = self.config.hysteresis_window;
        let raw = inputs.brake;
        let is_braking = self.brake.filtered(window, raw) > self.config.brake_threshold;

        let kind = if is_braking && !self.was_braking {
            Some(MarkerKind::BrakeStart)
        } else if !is_braking && self.was_braking {
            Some(MarkerKind::BrakeRelease)
        } else if is_braking
            && raw > self.config.peak_min_brake
            && self.brake.prior(PEAK_LOOKBACK).all(|&p| raw > p)
        {
            Some(MarkerKind::BrakePeak)
        } else {
            None
        };

        self.was_braking = is_braking;
        kind.map(|k| {
            debug!(marker = %k, pressure = raw, speed = inputs.speed_kmh, "Brake marker");
            Marker::new(k, timestamp, raw, inputs.speed_kmh)
        })
    }

    fn detect_throttle(&mut self, inputs: &CarInputs, timestamp: f64) -> Option<Marker> {
        let window = self.config.hysteresis_window;
        let raw = inputs.throttle;
        let is_throttling = self.throttle.filtered(window, raw) > self.config.throttle_threshold;

        let kind = if is_throttling && !self.was_throttling {
            Some(MarkerKind::ThrottlePickup)
        } else if !is_throttling && self.was_throttling {
            Some(MarkerKind::ThrottleRelease)
        } else if is_throttling
            && self.throttle.prior(PEAK_LOOKBACK).all(|&p| raw > p)
            && self
                .throttle
                .previous()
                .is_some_and(|prev| raw - prev > self.config.opening_min_delta)
        {
            Some(MarkerKind::ThrottleOpening)
        } else {
            None
        };

        self.was_throttling = is_throttling;
        kind.map(|k| {
            debug!(marker = %k, position = raw, speed = inputs.speed_kmh, "Throttle marker");
            Marker::new(k, timestamp, raw, inputs.speed_kmh)
        })
    }

    fn detect_speed_minimum(&self, inputs: &CarInputs, timestamp: f64) -> Option<Marker> {
        let window = self.config.hysteresis_window;
        if self.speed.len() < window {
            return None;
        }
        let current = inputs.speed_kmh;
        if self.speed.last_n(window).all(|&s| current <= s) {
            debug!(speed = current, "Speed minimum");
            Some(Marker::new(MarkerKind::SpeedMinimum, timestamp, current, current))
        } else {
            None
        }
    }

    pub fn is_braking(&self) -> bool {
        self.was_braking
    }

    pub fn is_throttling(&self) -> bool {
        self.was_throttling
    }

    /// Forget all history. Only for an explicit stream restart.
    pub fn reset(&mut self) {
        self.brake.clear();
        self.throttle.clear();
        self.speed.clear();
        self.was_braking = false;
        self.was_throttling = false;
    }
}
