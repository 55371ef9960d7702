//! Phase Segmenter - Idle → Entry → Rotation → Exit state machine
//!
//! Consumes markers in arrival order and emits one `TurnSegment` per corner
//! when the throttle opens in the Exit phase. Missing intermediate markers
//! leave the matching duration `None`; a segment is never held back waiting
//! for data that may not come.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{Marker, MarkerKind, PhaseSlip, TurnMarkers, TurnPhase, TurnSegment};

/// Segmenter state. `Idle` means no corner is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterState {
    Idle,
    Entry,
    Rotation,
    Exit,
}

impl SegmenterState {
    pub fn phase(&self) -> Option<TurnPhase> {
        match self {
            SegmenterState::Idle => None,
            SegmenterState::Entry => Some(TurnPhase::Entry),
            SegmenterState::Rotation => Some(TurnPhase::Rotation),
            SegmenterState::Exit => Some(TurnPhase::Exit),
        }
    }
}

/// Corner currently being driven.
#[derive(Debug, Clone)]
struct LiveTurn {
    start_time: f64,
    markers: TurnMarkers,
    /// Time Entry handed over to Rotation (release or apex)
    rotation_start: Option<f64>,
    /// Throttle opened while in Exit
    opened: bool,
}

/// Segmenter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterStats {
    pub completed: u64,
    pub partial: u64,
    pub abandoned: u64,
}

#[derive(Debug, Clone)]
pub struct PhaseSegmenter {
    state: SegmenterState,
    live: Option<LiveTurn>,
    next_turn_id: u64,
    stats: SegmenterStats,
}

impl Default for PhaseSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseSegmenter {
    pub fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            live: None,
            next_turn_id: 1,
            stats: SegmenterStats::default(),
        }
    }

    /// Apply one sample's markers; returns the segment if the corner completed.
    pub fn process(&mut self, markers: &[Marker]) -> Option<TurnSegment> {
        for marker in markers {
            self.apply(marker);
        }
        self.check_completion()
    }

    fn apply(&mut self, marker: &Marker) {
        let Some(live) = self.live.as_mut() else {
            // Idle: only a brake application opens a corner
            if marker.kind == MarkerKind::BrakeStart {
                debug!(speed = marker.speed_kmh, t = marker.timestamp, "Turn entry");
                self.live = Some(LiveTurn {
                    start_time: marker.timestamp,
                    markers: TurnMarkers {
                        brake_start: Some(*marker),
                        entry_speed_kmh: Some(marker.speed_kmh),
                        ..Default::default()
                    },
                    rotation_start: None,
                    opened: false,
                });
                self.state = SegmenterState::Entry;
            }
            return;
        };

        let m = &mut live.markers;
        match marker.kind {
            MarkerKind::BrakeStart => {
                if m.brake_start.is_none() {
                    m.brake_start = Some(*marker);
                }
            }
            MarkerKind::BrakePeak => m.brake_peak = Some(*marker),
            MarkerKind::BrakeRelease => {
                m.brake_release = Some(*marker);
                if self.state == SegmenterState::Entry {
                    self.state = SegmenterState::Rotation;
                    live.rotation_start = Some(marker.timestamp);
                    debug!(t = marker.timestamp, "Entry -> Rotation (brake release)");
                }
            }
            MarkerKind::SpeedMinimum => {
                m.apex = Some(*marker);
                m.min_speed_kmh = Some(match m.min_speed_kmh {
                    Some(held) => held.min(marker.speed_kmh),
                    None => marker.speed_kmh,
                });
                if self.state == SegmenterState::Entry {
                    self.state = SegmenterState::Rotation;
                    live.rotation_start = Some(marker.timestamp);
                    debug!(speed = marker.speed_kmh, "Entry -> Rotation (apex)");
                }
            }
            MarkerKind::ThrottlePickup => {
                m.throttle_pickup = Some(*marker);
                if matches!(self.state, SegmenterState::Entry | SegmenterState::Rotation) {
                    self.state = SegmenterState::Exit;
                    debug!(t = marker.timestamp, "-> Exit (throttle pickup)");
                }
            }
            MarkerKind::ThrottleOpening => {
                m.throttle_opening = Some(*marker);
                if self.state == SegmenterState::Exit {
                    live.opened = true;
                }
            }
            MarkerKind::ThrottleRelease => {}
        }
    }

    fn check_completion(&mut self) -> Option<TurnSegment> {
        if self.state != SegmenterState::Exit || !self.live.as_ref().is_some_and(|l| l.opened) {
            return None;
        }
        let live = self.live.take()?;
        self.state = SegmenterState::Idle;

        let mut markers = live.markers;
        let ts = |m: &Option<Marker>| m.as_ref().map(|m| m.timestamp);
        let start = ts(&markers.brake_start);
        let release = ts(&markers.brake_release);
        let pickup = ts(&markers.throttle_pickup);
        let opening = ts(&markers.throttle_opening);

        let entry_ms = start.zip(release).map(|(s, r)| (r - s) * 1000.0);
        let rotation_ms = match (release, pickup) {
            (Some(r), Some(p)) if r < p => Some((p - r) * 1000.0),
            (_, Some(p)) => live.rotation_start.map(|rs| (p - rs) * 1000.0),
            _ => None,
        };
        let trail_braking_ms = match (pickup, release) {
            (Some(p), Some(r)) if p < r => Some((r - p) * 1000.0),
            _ => None,
        };
        let exit_ms = pickup.zip(opening).map(|(p, o)| (o - p) * 1000.0);
        markers.exit_speed_kmh = markers.throttle_opening.map(|m| m.speed_kmh);

        let end_time = opening.unwrap_or(live.start_time);
        let segment = TurnSegment {
            turn_id: self.next_turn_id,
            lap_number: 0,
            corner_index: 0,
            start_time: live.start_time,
            end_time,
            phase: TurnPhase::Exit,
            markers,
            entry_ms,
            rotation_ms,
            exit_ms,
            trail_braking_ms,
            phase_slip: PhaseSlip::default(),
        };
        self.next_turn_id += 1;
        self.stats.completed += 1;
        if segment.is_partial() {
            self.stats.partial += 1;
        }

        info!(
            turn_id = segment.turn_id,
            duration_ms = segment.duration_ms(),
            entry_ms = ?segment.entry_ms,
            rotation_ms = ?segment.rotation_ms,
            trail_ms = ?segment.trail_braking_ms,
            "Turn completed"
        );
        Some(segment)
    }

    /// Discard the live corner, if any. Returns whether one was discarded.
    pub fn abandon(&mut self) -> bool {
        self.state = SegmenterState::Idle;
        match self.live.take() {
            Some(live) => {
                self.stats.abandoned += 1;
                debug!(start = live.start_time, "Live turn abandoned");
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Phase of the live corner, `None` when idle.
    pub fn current_phase(&self) -> Option<TurnPhase> {
        self.state.phase()
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats
    }
}
