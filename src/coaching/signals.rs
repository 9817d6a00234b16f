//! Emotion and limiting-belief signals in founder messages.
//!
//! Detection is read-only. The session decides what to record and does so
//! through the explicit state reducers.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::text::{IndicatorTable, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Fear,
    Overwhelm,
    Frustration,
    Doubt,
    Excitement,
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fear => "fear",
            Self::Overwhelm => "overwhelm",
            Self::Frustration => "frustration",
            Self::Doubt => "doubt",
            Self::Excitement => "excitement",
        };
        write!(f, "{s}")
    }
}

/// Self-limiting beliefs the coaching tries to surface and reframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitingBelief {
    NotGoodWithNumbers,
    TooOld,
    NoSalesTalent,
    FearOfFailure,
    NotEnoughCapital,
    NotAnEntrepreneur,
}

impl std::fmt::Display for LimitingBelief {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotGoodWithNumbers => "not_good_with_numbers",
            Self::TooOld => "too_old",
            Self::NoSalesTalent => "no_sales_talent",
            Self::FearOfFailure => "fear_of_failure",
            Self::NotEnoughCapital => "not_enough_capital",
            Self::NotAnEntrepreneur => "not_an_entrepreneur",
        };
        write!(f, "{s}")
    }
}

pub const SIGNAL_INDICATOR_VERSION: &str = "signals-2024.1";

const EMOTION_PHRASES: &[(Emotion, &[&str])] = &[
    (
        Emotion::Fear,
        &["angst", "ich fürchte", "macht mir sorgen", "sorgen", "scared", "afraid"],
    ),
    (
        Emotion::Overwhelm,
        &["überfordert", "zu viel", "wächst mir über den kopf", "überwältigt", "overwhelmed"],
    ),
    (
        Emotion::Frustration,
        &["frustriert", "nervt", "ärgert mich", "genervt", "frustrated"],
    ),
    (
        Emotion::Doubt,
        &["zweifel", "zweifle", "ob ich das kann", "ob das klappt", "not sure i can"],
    ),
    (
        Emotion::Excitement,
        &["freue mich riesig", "bin begeistert", "aufgeregt", "excited"],
    ),
];

const BELIEF_PHRASES: &[(LimitingBelief, &[&str])] = &[
    (
        LimitingBelief::NotGoodWithNumbers,
        &[
            "nicht gut mit zahlen",
            "kann nicht rechnen",
            "zahlen sind nicht mein ding",
            "mathe war nie",
            "bad with numbers",
        ],
    ),
    (
        LimitingBelief::TooOld,
        &["zu alt", "in meinem alter", "too old"],
    ),
    (
        LimitingBelief::NoSalesTalent,
        &["kann nicht verkaufen", "bin kein verkäufer", "verkaufen liegt mir nicht", "can't sell"],
    ),
    (
        LimitingBelief::FearOfFailure,
        &["wenn es scheitert", "wenn ich scheitere", "alles verlieren", "pleite gehen", "if i fail"],
    ),
    (
        LimitingBelief::NotEnoughCapital,
        &["kein geld", "zu wenig kapital", "kein eigenkapital", "no money"],
    ),
    (
        LimitingBelief::NotAnEntrepreneur,
        &["bin kein unternehmer", "kein unternehmertyp", "nicht der typ dafür", "not an entrepreneur"],
    ),
];

static EMOTIONS: Lazy<IndicatorTable<Emotion>> = Lazy::new(|| {
    IndicatorTable::build(SIGNAL_INDICATOR_VERSION, EMOTION_PHRASES)
        .expect("built-in emotion table compiles")
});

static BELIEFS: Lazy<IndicatorTable<LimitingBelief>> = Lazy::new(|| {
    IndicatorTable::build(SIGNAL_INDICATOR_VERSION, BELIEF_PHRASES)
        .expect("built-in belief table compiles")
});

/// The strongest emotion expressed in `text`, if any.
///
/// Ties resolve to the earlier entry in the table, which lists the emotions
/// most in need of an empathic response first.
pub fn detect_emotion(text: &str) -> Option<Emotion> {
    let normalized = normalize(text);
    let mut best: Option<(Emotion, usize)> = None;
    for (emotion, set) in EMOTIONS.iter() {
        let hits = set.count(&normalized);
        if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
            best = Some((emotion, hits));
        }
    }
    best.map(|(emotion, _)| emotion)
}

/// All limiting beliefs voiced in `text`, in table order.
pub fn detect_beliefs(text: &str) -> Vec<LimitingBelief> {
    let normalized = normalize(text);
    BELIEFS
        .iter()
        .filter(|(_, set)| set.is_match(&normalized))
        .map(|(belief, _)| belief)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_overwhelm() {
        assert_eq!(
            detect_emotion("Ehrlich gesagt bin ich total überfordert."),
            Some(Emotion::Overwhelm)
        );
    }

    #[test]
    fn no_emotion_in_neutral_text() {
        assert_eq!(detect_emotion("Ich verkaufe Kaffee."), None);
        assert_eq!(detect_emotion(""), None);
    }

    #[test]
    fn tie_prefers_earlier_emotion() {
        assert_eq!(detect_emotion("Angst und frustriert."), Some(Emotion::Fear));
    }

    #[test]
    fn detects_multiple_beliefs() {
        let beliefs =
            detect_beliefs("Ich bin nicht gut mit Zahlen und mit 58 bin ich doch zu alt dafür.");
        assert_eq!(
            beliefs,
            vec![LimitingBelief::NotGoodWithNumbers, LimitingBelief::TooOld]
        );
    }

    #[test]
    fn belief_matches_once_per_type() {
        let beliefs = detect_beliefs("zu alt, viel zu alt, einfach zu alt");
        assert_eq!(beliefs, vec![LimitingBelief::TooOld]);
    }
}
