//! Per-stream signal agents
//!
//! - **Marker Detector**: hysteresis-filtered brake/throttle/speed events, one call per sample
//! - **Phase Segmenter**: turns the marker stream into Entry/Rotation/Exit corner segments

pub mod marker_detector;
pub mod phase_segmenter;

pub use marker_detector::MarkerDetector;
pub use phase_segmenter::{PhaseSegmenter, SegmenterState, SegmenterStats};
