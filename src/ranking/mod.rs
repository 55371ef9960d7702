//! Corner ranking and reference quality

pub mod corner_ranker;
pub mod reference_quality;

pub use corner_ranker::CornerRanker;
pub use reference_quality::{filter_high_quality, quality_score};
