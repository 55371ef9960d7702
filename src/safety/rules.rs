//! Safety rule table: (phase, ampel color) → permitted (action, intensity) pairs
//!
//! Built once from exhaustive matches over the closed enums and shared by the
//! candidate generator and the resolver, so both always agree on what is safe.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::types::{ActionIntensity, ActionType, AmpelColor, TurnPhase};

pub type AllowedSet = HashSet<(ActionType, ActionIntensity)>;

#[derive(Debug, Clone)]
pub struct SafetyRuleTable {
    allowed: HashMap<(TurnPhase, AmpelColor), AllowedSet>,
}

impl SafetyRuleTable {
    /// Build the full table.
    pub fn new() -> Self {
        let mut allowed = HashMap::new();
        for phase in TurnPhase::ALL {
            for color in AmpelColor::ALL {
                let set: AllowedSet = ActionType::ALL
                    .iter()
                    .flat_map(|&a| ActionIntensity::ALL.iter().map(move |&i| (a, i)))
                    .filter(|&(a, i)| Self::rule(phase, color, a, i))
                    .collect();
                allowed.insert((phase, color), set);
            }
        }
        Self { allowed }
    }

    /// Shared handle for the generator and resolver.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The predicate the table is built from.
    fn rule(phase: TurnPhase, color: AmpelColor, action: ActionType, intensity: ActionIntensity) -> bool {
        if action.phase() != phase {
            return false;
        }
        match color {
            AmpelColor::Green => true,
            AmpelColor::Yellow => intensity.is_gentle(),
            AmpelColor::Red => !Self::blocked_on_red(action),
        }
    }

    /// The most aggressive action of a phase, forbidden under Red.
    fn blocked_on_red(action: ActionType) -> bool {
        match action {
            ActionType::BuildPressureFaster | ActionType::ThrottleEarlierProgressive => true,
            ActionType::BrakeEarlier | ActionType::ReleaseEarlier | ActionType::ReduceSteeringThenGas => false,
        }
    }

    pub fn is_allowed(
        &self,
        phase: TurnPhase,
        color: AmpelColor,
        action: ActionType,
        intensity: ActionIntensity,
    ) -> bool {
        self.allowed
            .get(&(phase, color))
            .is_some_and(|set| set.contains(&(action, intensity)))
    }

    pub fn allowed(&self, phase: TurnPhase, color: AmpelColor) -> Option<&AllowedSet> {
        self.allowed.get(&(phase, color))
    }
}

impl Default for SafetyRuleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_cell_is_populated() {
        let table = SafetyRuleTable::new();
        for phase in TurnPhase::ALL {
            for color in AmpelColor::ALL {
                let set = table.allowed(phase, color).unwrap();
                assert!(!set.is_empty(), "{phase} {color} must permit something");
            }
        }
    }

    #[test]
    fn test_actions_only_in_native_phase() {
        let table = SafetyRuleTable::new();
        for phase in TurnPhase::ALL {
            for &(action, _) in table.allowed(phase, AmpelColor::Green).unwrap() {
                assert_eq!(action.phase(), phase);
            }
        }
        assert!(!table.is_allowed(
            TurnPhase::Exit,
            AmpelColor::Green,
            ActionType::BrakeEarlier,
            ActionIntensity::Soft
        ));
    }

    #[test]
    fn test_red_blocks_most_aggressive_action() {
        let table = SafetyRuleTable::new();
        for i in ActionIntensity::ALL {
            assert!(!table.is_allowed(TurnPhase::Entry, AmpelColor::Red, ActionType::BuildPressureFaster, i));
            assert!(!table.is_allowed(
                TurnPhase::Exit,
                AmpelColor::Red,
                ActionType::ThrottleEarlierProgressive,
                i
            ));
        }
        assert!(table.is_allowed(
            TurnPhase::Entry,
            AmpelColor::Red,
            ActionType::BrakeEarlier,
            ActionIntensity::Progressive
        ));
        assert!(table.is_allowed(
            TurnPhase::Exit,
            AmpelColor::Red,
            ActionType::ReduceSteeringThenGas,
            ActionIntensity::Progressive
        ));
    }

    #[test]
    fn test_yellow_only_gentle_intensities() {
        let table = SafetyRuleTable::new();
        for phase in TurnPhase::ALL {
            for &(_, intensity) in table.allowed(phase, AmpelColor::Yellow).unwrap() {
                assert!(intensity.is_gentle());
            }
        }
        assert!(!table.is_allowed(
            TurnPhase::Entry,
            AmpelColor::Yellow,
            ActionType::BuildPressureFaster,
            ActionIntensity::Fast
        ));
        assert!(table.is_allowed(
            TurnPhase::Entry,
            AmpelColor::Yellow,
            ActionType::BuildPressureFaster,
            ActionIntensity::Soft
        ));
    }

    #[test]
    fn test_green_permits_everything_native() {
        let table = SafetyRuleTable::new();
        let entry = table.allowed(TurnPhase::Entry, AmpelColor::Green).unwrap();
        assert_eq!(entry.len(), 2 * ActionIntensity::ALL.len());
    }
}
