//! Processing Pipeline Module
//!
//! ```text
//! source ──► StreamContext ──(finished lap)──► CoachingCoordinator ──► sink / observer
//!            gate, markers,     bounded mpsc     ampels, ranking,
//!            phases, slip                        candidates, safety gate
//! ```
//!
//! Per-sample work is synchronous and owned by one `StreamContext` per stream.
//! Lap analysis runs on a separate worker so ingestion never waits on it.

pub mod context;
pub mod coordinator;
pub mod processing_loop;
pub mod source;

pub use context::{LapAnalysisRequest, LapStats, StreamContext};
pub use coordinator::{CoachingCoordinator, CoordinatorStats};
pub use processing_loop::{LoopStats, ProcessingLoop, SessionHooks};
pub use source::{JsonLinesSource, ReplaySource, SourceEvent, SyntheticSource, TelemetrySource};
