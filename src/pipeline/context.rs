//! Session-scoped stream state
//!
//! One `StreamContext` per telemetry stream owns every piece of per-sample
//! state: the gate, the marker detector, the phase segmenter, the worst slip
//! per phase of the live corner, and lap bookkeeping. When a valid lap
//! finishes it produces an immutable `LapAnalysisRequest` for the analysis
//! worker.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::agents::{MarkerDetector, PhaseSegmenter};
use crate::config::defaults::LAP_TIME_HISTORY;
use crate::config::CoachConfig;
use crate::gating::{GatingMetrics, GatingService};
use crate::slip::SlipCalculator;
use crate::types::{PhaseSlip, SessionContext, TelemetrySample, TurnSegment};

/// Everything the analysis worker needs for one finished lap.
#[derive(Debug, Clone)]
pub struct LapAnalysisRequest {
    pub session: SessionContext,
    pub lap_number: u16,
    pub segments: Arc<[TurnSegment]>,
    /// Corner time history (ms) per corner ordinal, this lap included
    pub corner_times: BTreeMap<u32, Vec<f64>>,
    /// Completed valid lap times (ms), oldest first
    pub lap_times: Vec<f64>,
}

/// Lap-level counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LapStats {
    pub laps_completed: u64,
    pub laps_discarded: u64,
    pub segments_completed: u64,
}

#[derive(Debug)]
pub struct StreamContext {
    gate: GatingService,
    detector: MarkerDetector,
    segmenter: PhaseSegmenter,
    slip: SlipCalculator,
    /// Worst slip per phase of the live corner
    live_slip: PhaseSlip,
    session: Option<SessionContext>,
    current_lap: Option<u16>,
    lap_valid: bool,
    lap_time_ms: u32,
    lap_segments: Vec<TurnSegment>,
    corner_history: BTreeMap<u32, VecDeque<f64>>,
    lap_times: VecDeque<f64>,
    corner_history_laps: usize,
    lap_stats: LapStats,
}

impl StreamContext {
    pub fn new(config: &CoachConfig) -> Self {
        Self {
            gate: GatingService::new(&config.gating),
            detector: MarkerDetector::new(&config.markers),
            segmenter: PhaseSegmenter::new(),
            slip: SlipCalculator::new(&config.slip),
            live_slip: PhaseSlip::default(),
            session: None,
            current_lap: None,
            lap_valid: true,
            lap_time_ms: 0,
            lap_segments: Vec::new(),
            corner_history: BTreeMap::new(),
            lap_times: VecDeque::with_capacity(LAP_TIME_HISTORY),
            corner_history_laps: config.ranking.corner_history_laps,
            lap_stats: LapStats::default(),
        }
    }

    /// Feed one decoded sample. Returns a request when a valid lap with corners finished.
    pub fn ingest(&mut self, sample: &TelemetrySample) -> Option<LapAnalysisRequest> {
        self.track_session(&sample.session);

        let admitted = self.gate.admit_sample(sample);
        if !(self.gate.is_time_trial(&sample.session) && sample.is_player_car()) {
            return None;
        }

        let request = self.track_lap(sample);
        if admitted {
            self.process_admitted(sample);
        }
        request
    }

    fn track_session(&mut self, session: &SessionContext) {
        match &self.session {
            Some(current) if current.session_uid == session.session_uid => {}
            Some(current) => {
                info!(
                    old = current.session_uid,
                    new = session.session_uid,
                    track = session.track_id,
                    "Session changed, resetting stream context"
                );
                self.reset_session();
                self.session = Some(session.clone());
            }
            None => {
                info!(session = session.session_uid, track = session.track_id, "Session started");
                self.session = Some(session.clone());
            }
        }
    }

    /// Lap bookkeeping for the controlled car; closes the previous lap on a lap change.
    fn track_lap(&mut self, sample: &TelemetrySample) -> Option<LapAnalysisRequest> {
        let lap = &sample.lap;
        let mut request = None;

        match self.current_lap {
            Some(current) if current == lap.lap_number => {}
            Some(_) => {
                if self.segmenter.abandon() {
                    debug!(lap = lap.lap_number, "Lap change abandoned live turn");
                }
                self.live_slip = PhaseSlip::default();
                request = self.finish_lap(&sample.session);
                self.start_lap(lap.lap_number);
            }
            None => self.start_lap(lap.lap_number),
        }

        if !lap.is_valid && self.lap_valid {
            debug!(lap = lap.lap_number, "Lap invalidated");
            self.lap_valid = false;
            self.segmenter.abandon();
            self.live_slip = PhaseSlip::default();
        }
        self.lap_time_ms = self.lap_time_ms.max(lap.current_lap_time_ms);
        request
    }

    fn start_lap(&mut self, lap_number: u16) {
        self.current_lap = Some(lap_number);
        self.lap_valid = true;
        self.lap_time_ms = 0;
        self.lap_segments.clear();
    }

    fn finish_lap(&mut self, session: &SessionContext) -> Option<LapAnalysisRequest> {
        let lap_number = self.current_lap?;
        if !self.lap_valid || self.lap_segments.is_empty() {
            self.lap_stats.laps_discarded += 1;
            debug!(lap = lap_number, valid = self.lap_valid, "Lap not analysed");
            return None;
        }
        self.lap_stats.laps_completed += 1;

        for segment in &self.lap_segments {
            let history = self.corner_history.entry(segment.corner_index).or_default();
            history.push_back(segment.duration_ms());
            while history.len() > self.corner_history_laps {
                history.pop_front();
            }
        }
        if self.lap_time_ms > 0 {
            if self.lap_times.len() >= LAP_TIME_HISTORY {
                self.lap_times.pop_front();
            }
            self.lap_times.push_back(f64::from(self.lap_time_ms));
        }

        info!(
            lap = lap_number,
            corners = self.lap_segments.len(),
            lap_time_ms = self.lap_time_ms,
            "Lap completed"
        );

        Some(LapAnalysisRequest {
            session: self.session.clone().unwrap_or_else(|| session.clone()),
            lap_number,
            segments: std::mem::take(&mut self.lap_segments).into(),
            corner_times: self.corner_times_snapshot(),
            lap_times: self.lap_times.iter().copied().collect(),
        })
    }

    fn process_admitted(&mut self, sample: &TelemetrySample) {
        let markers = self.detector.detect(&sample.inputs, sample.timestamp);
        let phase_before = self.segmenter.current_phase();
        let metrics = sample.slip.as_ref().map(|s| self.slip.calculate(s));

        match self.segmenter.process(&markers) {
            Some(mut segment) => {
                if let (Some(phase), Some(m)) = (phase_before, metrics) {
                    self.live_slip.record(phase, m);
                }
                segment.lap_number = sample.lap.lap_number;
                segment.corner_index = self.lap_segments.len() as u32 + 1;
                segment.phase_slip = std::mem::take(&mut self.live_slip);
                self.lap_stats.segments_completed += 1;
                self.lap_segments.push(segment);
            }
            None => {
                if let (Some(phase), Some(m)) = (self.segmenter.current_phase(), metrics) {
                    self.live_slip.record(phase, m);
                }
            }
        }
    }

    /// Clear everything tied to the session. The detector keeps its window.
    fn reset_session(&mut self) {
        info!("{}", self.gate.metrics());
        self.gate.reset_metrics();
        self.segmenter = PhaseSegmenter::new();
        self.live_slip = PhaseSlip::default();
        self.current_lap = None;
        self.lap_valid = true;
        self.lap_time_ms = 0;
        self.lap_segments.clear();
        self.corner_history.clear();
        self.lap_times.clear();
        self.lap_stats = LapStats::default();
    }

    /// Explicit stream restart: session state and the detector window.
    pub fn restart(&mut self) {
        self.reset_session();
        self.detector.reset();
        self.session = None;
    }

    pub fn corner_times_snapshot(&self) -> BTreeMap<u32, Vec<f64>> {
        self.corner_history
            .iter()
            .map(|(&id, times)| (id, times.iter().copied().collect()))
            .collect()
    }

    pub fn gating_metrics(&self) -> GatingMetrics {
        self.gate.metrics()
    }

    pub fn lap_stats(&self) -> LapStats {
        self.lap_stats
    }

    pub fn current_lap(&self) -> Option<u16> {
        self.current_lap
    }

    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    pub fn segmenter(&self) -> &PhaseSegmenter {
        &self.segmenter
    }

    pub fn lap_segments(&self) -> &[TurnSegment] {
        &self.lap_segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CarInputs, LapContext, WheelSlip};

    struct Driver {
        t: f64,
        lap: u16,
        lap_ms: u32,
        session_uid: u64,
        valid: bool,
    }

    impl Driver {
        fn new() -> Self {
            Self { t: 0.0, lap: 1, lap_ms: 0, session_uid: 1, valid: true }
        }

        fn sample(&mut self, brake: f64, throttle: f64, speed: f64, slip: Option<WheelSlip>) -> TelemetrySample {
            self.t += 0.1;
            self.lap_ms += 100;
            TelemetrySample {
                timestamp: self.t,
                car_index: 0,
                player_car_index: 0,
                session: SessionContext {
                    session_uid: self.session_uid,
                    track_id: 5,
                    session_type: 12,
                    is_time_trial: true,
                    session_time: self.t,
                },
                lap: LapContext {
                    lap_number: self.lap,
                    lap_distance: 0.0,
                    current_lap_time_ms: self.lap_ms,
                    is_valid: self.valid,
                },
                inputs: CarInputs {
                    speed_kmh: speed,
                    throttle,
                    brake,
                    ..Default::default()
                },
                slip,
            }
        }

        /// One corner: cruise, brake, coast, throttle.
        fn corner(&mut self, ctx: &mut StreamContext, slip: Option<WheelSlip>) -> Option<LapAnalysisRequest> {
            let mut out = None;
            let mut feed = |d: &mut Driver, b: f64, th: f64, v: f64| {
                let s = d.sample(b, th, v, slip.clone());
                if let Some(r) = ctx.ingest(&s) {
                    out = Some(r);
                }
            };
            for _ in 0..4 {
                feed(self, 0.0, 1.0, 250.0);
            }
            for i in 0..6 {
                feed(self, 0.9, 0.0, 240.0 - 20.0 * f64::from(i));
            }
            for i in 0..4 {
                feed(self, 0.0, 0.0, 125.0 + f64::from(i));
            }
            for i in 1..=6 {
                feed(self, 0.0, 0.2 * f64::from(i).min(5.0), 130.0 + 10.0 * f64::from(i));
            }
            out
        }
    }

    fn context() -> StreamContext {
        StreamContext::new(&CoachConfig::default())
    }

    #[test]
    fn test_lap_change_emits_request() {
        let mut ctx = context();
        let mut d = Driver::new();
        assert!(d.corner(&mut ctx, None).is_none());
        assert!(d.corner(&mut ctx, None).is_none());
        assert_eq!(ctx.lap_segments().len(), 2);

        d.lap = 2;
        d.lap_ms = 0;
        let s = d.sample(0.0, 1.0, 250.0, None);
        let request = ctx.ingest(&s).unwrap();
        assert_eq!(request.lap_number, 1);
        assert_eq!(request.segments.len(), 2);
        assert_eq!(request.segments[0].corner_index, 1);
        assert_eq!(request.segments[1].corner_index, 2);
        assert_eq!(request.corner_times.len(), 2);
        assert_eq!(request.lap_times.len(), 1);
        assert_eq!(ctx.lap_stats().laps_completed, 1);
        assert!(ctx.lap_segments().is_empty());
    }

    #[test]
    fn test_phase_slip_attached_to_segment() {
        let mut ctx = context();
        let mut d = Driver::new();
        let slip = WheelSlip::new([0.1, 0.1, 0.05, 0.05], [0.1, 0.1, 0.1, 0.1]);
        d.corner(&mut ctx, Some(slip));
        let segment = &ctx.lap_segments()[0];
        // Falling speed fires the apex proxy right after brake start, so the
        // braking samples land in Rotation
        assert!(segment.phase_slip.rotation.is_some());
        assert!(segment.phase_slip.exit.is_some());
    }

    #[test]
    fn test_invalid_lap_discarded() {
        let mut ctx = context();
        let mut d = Driver::new();
        d.corner(&mut ctx, None);
        d.valid = false;
        d.corner(&mut ctx, None);
        d.lap = 2;
        d.valid = true;
        let s = d.sample(0.0, 1.0, 250.0, None);
        assert!(ctx.ingest(&s).is_none());
        assert_eq!(ctx.lap_stats().laps_discarded, 1);
        assert!(ctx.corner_times_snapshot().is_empty());
        assert!(ctx.gating_metrics().filtered_invalid_lap > 0);
    }

    #[test]
    fn test_lap_change_abandons_live_turn() {
        let mut ctx = context();
        let mut d = Driver::new();
        for _ in 0..3 {
            let s = d.sample(0.9, 0.0, 200.0, None);
            ctx.ingest(&s);
        }
        assert!(ctx.segmenter().current_phase().is_some());
        d.lap = 2;
        let s = d.sample(0.9, 0.0, 190.0, None);
        ctx.ingest(&s);
        assert_eq!(ctx.segmenter().stats().abandoned, 1);
    }

    #[test]
    fn test_session_change_resets_history() {
        let mut ctx = context();
        let mut d = Driver::new();
        d.corner(&mut ctx, None);
        d.lap = 2;
        let s = d.sample(0.0, 1.0, 250.0, None);
        assert!(ctx.ingest(&s).is_some());
        assert_eq!(ctx.corner_times_snapshot().len(), 1);

        d.session_uid = 2;
        let s = d.sample(0.0, 1.0, 250.0, None);
        assert!(ctx.ingest(&s).is_none());
        assert!(ctx.corner_times_snapshot().is_empty());
        assert_eq!(ctx.session().map(|s| s.session_uid), Some(2));
        assert_eq!(ctx.gating_metrics().total_samples, 1);
    }

    #[test]
    fn test_other_cars_ignored() {
        let mut ctx = context();
        let mut d = Driver::new();
        let mut s = d.sample(0.9, 0.0, 200.0, None);
        s.car_index = 3;
        s.lap.lap_number = 9;
        assert!(ctx.ingest(&s).is_none());
        assert_eq!(ctx.current_lap(), None);
        assert_eq!(ctx.gating_metrics().filtered_non_player, 1);
    }
}
