//! Safety layer
//!
//! - `ampel`: slip → Green/Yellow/Red per phase
//! - `rules`: the (phase, color) → allowed (action, intensity) table
//! - `resolver`: safety filter, conflict resolution, global limits, reports

pub mod ampel;
pub mod resolver;
pub mod rules;

pub use ampel::SafetyAmpelService;
pub use resolver::{SafetyFilterOutcome, SafetyGateResolver, SelectionValidation};
pub use rules::SafetyRuleTable;
