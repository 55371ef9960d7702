//! Shared data structures for the corner-coaching pipeline
//!
//! - `TelemetrySample`: decoded per-frame input (session, lap, inputs, wheel slip)
//! - `Marker`, `TurnSegment`: outputs of marker detection and phase segmentation
//! - `SlipMetrics`, `SafetyAmpel`: grip utilization and its traffic-light classification
//! - `CornerReference`, `CornerImpact`: reference baselines and per-lap ranking inputs
//! - `CoachingCandidate`, `SelectedAction`, `ActionResult`: coaching decisions and outcomes

mod telemetry;
mod turn;
mod slip;
mod corner;
mod coaching;

pub use telemetry::*;
pub use turn::*;
pub use slip::*;
pub use corner::*;
pub use coaching::*;
