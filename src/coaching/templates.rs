//! Coaching text templates
//!
//! Every phrase is a fixed string selected by exhaustive matches over the
//! closed action, intensity and color enums. Nothing is interpolated, so no
//! distance, time, speed or percentage can ever reach the driver.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::Locale;
use crate::types::{ActionIntensity, ActionType, AmpelColor, TurnPhase};

/// Coaching sentence for an action at an intensity.
pub fn user_text(action: ActionType, intensity: ActionIntensity, locale: Locale) -> &'static str {
    match locale {
        Locale::De => user_text_de(action, intensity),
        Locale::En => user_text_en(action, intensity),
    }
}

fn user_text_de(action: ActionType, intensity: ActionIntensity) -> &'static str {
    use crate::types::ActionIntensity as I;
    use crate::types::ActionType as A;
    match (action, intensity) {
        (A::BrakeEarlier, I::VerySoft) => "Etwas früher an die Bremse",
        (A::BrakeEarlier, I::Soft) => "Etwas früher bremsen",
        (A::BrakeEarlier, I::Progressive) => "Früher bremsen",
        (A::BrakeEarlier, I::Fast) => "Deutlich früher bremsen",
        (A::BrakeEarlier, _) => fallback_de(action),

        (A::BuildPressureFaster, I::Soft) => "Druck sanft aufbauen",
        (A::BuildPressureFaster, I::Progressive) => "Druck zügig aufbauen",
        (A::BuildPressureFaster, I::Fast) => "Druck schnell aufbauen",
        (A::BuildPressureFaster, I::VeryFast) => "Druck sehr schnell aufbauen",
        (A::BuildPressureFaster, _) => fallback_de(action),

        (A::ReleaseEarlier, I::VerySoft) => "Behutsam früher lösen",
        (A::ReleaseEarlier, I::Soft) => "Sanft früher lösen",
        (A::ReleaseEarlier, I::Progressive) => "Früher lösen",
        (A::ReleaseEarlier, I::Fast) => "Klar früher lösen",
        (A::ReleaseEarlier, _) => fallback_de(action),

        (A::ThrottleEarlierProgressive, I::VerySoft) => "Früher ans Gas, behutsam öffnen",
        (A::ThrottleEarlierProgressive, I::Soft) => "Früher ans Gas, sehr sanft öffnen",
        (A::ThrottleEarlierProgressive, I::Progressive) => "Früher ans Gas, progressiv öffnen",
        (A::ThrottleEarlierProgressive, I::Fast) => "Früher ans Gas, zügig öffnen",
        (A::ThrottleEarlierProgressive, _) => fallback_de(action),

        (A::ReduceSteeringThenGas, I::VerySoft) => "Lenkwinkel behutsam reduzieren, dann Gas",
        (A::ReduceSteeringThenGas, I::Soft) => "Lenkwinkel sanft reduzieren, dann Gas",
        (A::ReduceSteeringThenGas, I::Progressive) => "Lenkwinkel reduzieren, dann Gas",
        (A::ReduceSteeringThenGas, I::Fast) => "Lenkwinkel deutlich reduzieren, dann Gas",
        (A::ReduceSteeringThenGas, _) => fallback_de(action),
    }
}

/// Sentence for intensities without a dedicated phrase.
fn fallback_de(action: ActionType) -> &'static str {
    match action {
        ActionType::BrakeEarlier => "Früher bremsen",
        ActionType::BuildPressureFaster => "Druck schneller aufbauen",
        ActionType::ReleaseEarlier => "Früher lösen",
        ActionType::ThrottleEarlierProgressive => "Früher ans Gas, progressiv öffnen",
        ActionType::ReduceSteeringThenGas => "Lenkwinkel reduzieren, dann Gas",
    }
}

fn user_text_en(action: ActionType, intensity: ActionIntensity) -> &'static str {
    use crate::types::ActionIntensity as I;
    use crate::types::ActionType as A;
    match (action, intensity) {
        (A::BrakeEarlier, I::VerySoft) => "Touch the brake a little earlier",
        (A::BrakeEarlier, I::Soft) => "Brake slightly earlier",
        (A::BrakeEarlier, I::Progressive) => "Brake earlier",
        (A::BrakeEarlier, I::Fast) => "Brake clearly earlier",
        (A::BrakeEarlier, _) => fallback_en(action),

        (A::BuildPressureFaster, I::Soft) => "Build brake pressure gently",
        (A::BuildPressureFaster, I::Progressive) => "Build brake pressure briskly",
        (A::BuildPressureFaster, I::Fast) => "Build brake pressure fast",
        (A::BuildPressureFaster, I::VeryFast) => "Build brake pressure very fast",
        (A::BuildPressureFaster, _) => fallback_en(action),

        (A::ReleaseEarlier, I::VerySoft) => "Release the brake a little earlier, very gently",
        (A::ReleaseEarlier, I::Soft) => "Release the brake earlier, gently",
        (A::ReleaseEarlier, I::Progressive) => "Release the brake earlier",
        (A::ReleaseEarlier, I::Fast) => "Release the brake clearly earlier",
        (A::ReleaseEarlier, _) => fallback_en(action),

        (A::ThrottleEarlierProgressive, I::VerySoft) => "Throttle earlier, open very carefully",
        (A::ThrottleEarlierProgressive, I::Soft) => "Throttle earlier, open gently",
        (A::ThrottleEarlierProgressive, I::Progressive) => "Throttle earlier, open progressively",
        (A::ThrottleEarlierProgressive, I::Fast) => "Throttle earlier, open briskly",
        (A::ThrottleEarlierProgressive, _) => fallback_en(action),

        (A::ReduceSteeringThenGas, I::VerySoft) => "Unwind the steering very gently, then throttle",
        (A::ReduceSteeringThenGas, I::Soft) => "Unwind the steering gently, then throttle",
        (A::ReduceSteeringThenGas, I::Progressive) => "Unwind the steering, then throttle",
        (A::ReduceSteeringThenGas, I::Fast) => "Unwind the steering clearly, then throttle",
        (A::ReduceSteeringThenGas, _) => fallback_en(action),
    }
}

fn fallback_en(action: ActionType) -> &'static str {
    match action {
        ActionType::BrakeEarlier => "Brake earlier",
        ActionType::BuildPressureFaster => "Build brake pressure faster",
        ActionType::ReleaseEarlier => "Release the brake earlier",
        ActionType::ThrottleEarlierProgressive => "Throttle earlier, open progressively",
        ActionType::ReduceSteeringThenGas => "Unwind the steering, then throttle",
    }
}

/// Short focus cue for an action under a color. None where the action is not coached.
pub fn focus_hint(action: ActionType, color: AmpelColor, locale: Locale) -> Option<&'static str> {
    use crate::types::ActionType as A;
    use crate::types::AmpelColor as C;
    let (de, en) = match (action, color) {
        (A::BrakeEarlier, C::Green) => ("Hände ruhig halten", "Keep your hands calm"),
        (A::BrakeEarlier, C::Yellow) => ("Sanft und kontrolliert", "Smooth and controlled"),
        (A::BrakeEarlier, C::Red) => ("Sicherheit vor Tempo", "Safety before pace"),
        (A::BuildPressureFaster, C::Green) => ("Druckaufbau zügig", "Brisk pressure build"),
        (A::BuildPressureFaster, C::Yellow) => ("Progressiv steigern", "Increase progressively"),
        (A::BuildPressureFaster, C::Red) => return None,
        (A::ReleaseEarlier, C::Green) => ("Fließend lösen", "Release fluidly"),
        (A::ReleaseEarlier, C::Yellow) => ("Sanft reduzieren", "Reduce gently"),
        (A::ReleaseEarlier, C::Red) => ("Sehr behutsam", "Very carefully"),
        (A::ThrottleEarlierProgressive, C::Green) => ("Progressiv öffnen", "Open progressively"),
        (A::ThrottleEarlierProgressive, C::Yellow) => ("Sehr sanft öffnen", "Open very gently"),
        (A::ThrottleEarlierProgressive, C::Red) => return None,
        (A::ReduceSteeringThenGas, C::Green) => ("Lenkwinkel reduzieren, dann Gas", "Less steering, then throttle"),
        (A::ReduceSteeringThenGas, C::Yellow) => ("Sanft reduzieren, dann Gas", "Ease off gently, then throttle"),
        (A::ReduceSteeringThenGas, C::Red) => ("Traktion vor Tempo", "Traction before pace"),
    };
    Some(match locale {
        Locale::De => de,
        Locale::En => en,
    })
}

pub fn phase_label(phase: TurnPhase, locale: Locale) -> &'static str {
    match (phase, locale) {
        (TurnPhase::Entry, Locale::De) => "Einfahrt",
        (TurnPhase::Rotation, Locale::De) => "Rotation",
        (TurnPhase::Exit, Locale::De) => "Ausfahrt",
        (TurnPhase::Entry, Locale::En) => "Entry",
        (TurnPhase::Rotation, Locale::En) => "Rotation",
        (TurnPhase::Exit, Locale::En) => "Exit",
    }
}

/// Fixed phrases used by the session formatter.
#[derive(Debug, Clone, Copy)]
pub struct SessionPhrases {
    pub header: &'static str,
    pub corner: &'static str,
    pub try_carefully: &'static str,
    pub one_at_a_time: &'static str,
    pub no_suggestions: &'static str,
}

pub fn session_phrases(locale: Locale) -> SessionPhrases {
    match locale {
        Locale::De => SessionPhrases {
            header: "**Coaching Empfehlungen:**",
            corner: "Kurve",
            try_carefully: "*Vorsichtig versuchen*",
            one_at_a_time: "**Fokus:** Ein Punkt nach dem anderen umsetzen.",
            no_suggestions: "Keine Verbesserungsvorschläge für diese Runde. Gut gefahren!",
        },
        Locale::En => SessionPhrases {
            header: "**Coaching recommendations:**",
            corner: "Corner",
            try_carefully: "*Try carefully*",
            one_at_a_time: "**Focus:** Work on one point at a time.",
            no_suggestions: "No suggestions for this lap. Well driven!",
        },
    }
}

const NUMERIC_UNIT_PATTERNS: [&str; 4] = [
    // distance
    r"(?i)\d+(?:[.,]\d+)?\s*(?:m|meters?|metres?|meter|km)\b",
    // time
    r"(?i)\d+(?:[.,]\d+)?\s*(?:ms|s|sec|secs|seconds?|sek|sekunden?|min)\b",
    // speed
    r"(?i)\d+(?:[.,]\d+)?\s*(?:km/h|kmh|kph|mph)",
    // percentage
    r"\d+(?:[.,]\d+)?\s*%",
];

fn numeric_unit_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        NUMERIC_UNIT_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// True when `text` contains a number followed by a distance, time, speed or percent unit.
pub fn contains_numeric_units(text: &str) -> bool {
    numeric_unit_regexes().iter().any(|re| re.is_match(text))
}

/// Every fixed phrase for a locale, for validation.
pub fn all_phrases(locale: Locale) -> Vec<&'static str> {
    let mut phrases = Vec::new();
    for action in ActionType::ALL {
        for intensity in ActionIntensity::ALL {
            phrases.push(user_text(action, intensity, locale));
        }
        phrases.push(match locale {
            Locale::De => fallback_de(action),
            Locale::En => fallback_en(action),
        });
        for color in AmpelColor::ALL {
            phrases.extend(focus_hint(action, color, locale));
        }
    }
    for phase in TurnPhase::ALL {
        phrases.push(phase_label(phase, locale));
    }
    let s = session_phrases(locale);
    phrases.extend([s.header, s.corner, s.try_carefully, s.one_at_a_time, s.no_suggestions]);
    phrases
}
