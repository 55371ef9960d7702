//! Apex Coach: real-time corner coaching for time-trial telemetry
//!
//! Turns a stream of per-frame car telemetry into at most a handful of safe,
//! plain-language driving recommendations per lap.
//!
//! ## Architecture
//!
//! - **Gating**: only the controlled car, in time trial, on a valid lap
//! - **Agents**: marker detection and Entry/Rotation/Exit phase segmentation
//! - **Slip + Safety**: grip utilization, traffic-light ampels and the shared rule table
//! - **Statistics + Ranking**: robust spread, outlier rejection, corner impact
//! - **Coaching**: candidate generation, localized templates, final selection
//! - **Pipeline**: stream context, lap coordinator, sources and the processing loop

pub mod agents;
pub mod coaching;
pub mod config;
pub mod gating;
pub mod observability;
pub mod pipeline;
pub mod ranking;
pub mod safety;
pub mod simulation;
pub mod slip;
pub mod statistics;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::CoachConfig;

// Re-export commonly used types
pub use types::{
    ActionIntensity, ActionType, AmpelColor, CoachingCandidate, CornerAnalysisSession,
    CornerImpact, CornerReference, SelectedAction, TelemetrySample, TurnPhase, TurnSegment,
};

// Re-export pipeline entry points
pub use pipeline::{CoachingCoordinator, ProcessingLoop, StreamContext};

// Re-export storage
pub use storage::{ActionSink, InMemoryActionStore, InMemoryReferenceStore, ReferenceStore, SledActionStore};
