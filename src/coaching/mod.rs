//! Coaching decisions
//!
//! - `candidates`: ampel-gated proposals per corner phase
//! - `selector`: final actions, session output and summary
//! - `templates`: fixed driver-facing phrases per locale

pub mod candidates;
pub mod selector;
pub mod templates;

pub use candidates::{proposals, CandidateGenerator, Proposal};
pub use selector::{ActionSelector, SessionSummary};
pub use templates::contains_numeric_units;
