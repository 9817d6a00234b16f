//! Transtheoretical-model stage classifier.
//!
//! Classifies a founder's behavioral readiness from everything they have
//! written so far. The classifier is total: empty histories, assistant-only
//! histories, ties, and no-match texts all resolve to `Contemplation`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversation::{Message, user_texts};
use crate::text::{IndicatorTable, normalize};

/// Behavioral-readiness stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Precontemplation,
    Contemplation,
    Preparation,
    Action,
    Maintenance,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Self::Precontemplation,
        Self::Contemplation,
        Self::Preparation,
        Self::Action,
        Self::Maintenance,
    ];

    /// How deep the coaching should go for a founder in this stage.
    pub fn coaching_depth(&self) -> CoachingDepth {
        match self {
            Self::Precontemplation => CoachingDepth::Shallow,
            Self::Contemplation => CoachingDepth::Medium,
            Self::Preparation => CoachingDepth::Deep,
            Self::Action => CoachingDepth::Medium,
            Self::Maintenance => CoachingDepth::Shallow,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Contemplation
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Precontemplation => "precontemplation",
            Self::Contemplation => "contemplation",
            Self::Preparation => "preparation",
            Self::Action => "action",
            Self::Maintenance => "maintenance",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachingDepth {
    Shallow,
    Medium,
    Deep,
}

/// Recency weighting for stage detection.
///
/// Matches inside the last `recent_window` user messages count
/// `recent_weight` times; older matches count once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWeighting {
    pub recent_window: usize,
    pub recent_weight: usize,
}

impl Default for StageWeighting {
    fn default() -> Self {
        Self {
            recent_window: 3,
            recent_weight: 2,
        }
    }
}

/// Result of stage classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDetection {
    pub stage: Stage,
    pub coaching_depth: CoachingDepth,
    /// Indicator phrases of the selected stage found in the user's text.
    pub matched_indicators: Vec<String>,
    /// Weighted score per stage, in `Stage::ALL` order.
    pub scores: Vec<(Stage, usize)>,
}

pub const STAGE_INDICATOR_VERSION: &str = "ttm-2024.3";

const STAGE_PHRASES: &[(Stage, &[&str])] = &[
    (
        Stage::Precontemplation,
        &[
            "keine ahnung",
            "bringt doch nichts",
            "das amt will",
            "wurde geschickt",
            "muss das machen",
            "eigentlich nicht",
            "kein interesse",
            "sehe keinen sinn",
            "no idea why",
            "not interested",
        ],
    ),
    (
        Stage::Contemplation,
        &[
            "vielleicht",
            "ich überlege",
            "überlege mir",
            "unsicher",
            "einerseits",
            "andererseits",
            "bin mir nicht sicher",
            "weiß noch nicht",
            "maybe",
            "thinking about",
        ],
    ),
    (
        Stage::Preparation,
        &[
            "ich plane",
            "bereite mich vor",
            "bereite vor",
            "recherchiere",
            "informiere mich",
            "nächsten monat",
            "businessplan",
            "gründungszuschuss",
            "termin bei der bank",
            "planning to",
            "getting ready",
        ],
    ),
    (
        Stage::Action,
        &[
            "habe bereits",
            "habe schon",
            "erste kunden",
            "gewerbe angemeldet",
            "ersten umsatz",
            "läuft schon",
            "bin gestartet",
            "already started",
            "first customers",
        ],
    ),
    (
        Stage::Maintenance,
        &[
            "seit jahren",
            "seit über einem jahr",
            "etabliert",
            "stammkunden",
            "dranbleiben",
            "for years",
            "established",
        ],
    ),
];

static STAGE_INDICATORS: Lazy<IndicatorTable<Stage>> = Lazy::new(|| {
    IndicatorTable::build(STAGE_INDICATOR_VERSION, STAGE_PHRASES)
        .expect("built-in stage indicator table compiles")
});

/// The compiled built-in stage indicator table.
pub fn stage_indicators() -> &'static IndicatorTable<Stage> {
    &STAGE_INDICATORS
}

/// Classify with the default recency weighting.
pub fn detect_stage(messages: &[Message]) -> StageDetection {
    detect_stage_with(messages, &StageWeighting::default())
}

/// Classify the founder's stage from all user-authored text.
pub fn detect_stage_with(messages: &[Message], weighting: &StageWeighting) -> StageDetection {
    let normalized: Vec<String> = user_texts(messages).map(normalize).collect();
    let recent_from = normalized.len().saturating_sub(weighting.recent_window);

    let scores: Vec<(Stage, usize)> = Stage::ALL
        .iter()
        .map(|stage| {
            let score = normalized
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let weight = if i >= recent_from {
                        weighting.recent_weight.max(1)
                    } else {
                        1
                    };
                    STAGE_INDICATORS.count(*stage, text) * weight
                })
                .sum();
            (*stage, score)
        })
        .collect();

    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    let leaders: Vec<Stage> = scores
        .iter()
        .filter(|(_, s)| *s == best)
        .map(|(stage, _)| *stage)
        .collect();
    let stage = match leaders.as_slice() {
        [single] if best > 0 => *single,
        _ => Stage::Contemplation,
    };

    let matched_indicators = STAGE_INDICATORS
        .get(stage)
        .map(|set| {
            let mut found: Vec<String> = Vec::new();
            for text in &normalized {
                for phrase in set.matched_phrases(text) {
                    if !found.contains(&phrase) {
                        found.push(phrase);
                    }
                }
            }
            found
        })
        .unwrap_or_default();

    debug!(stage = %stage, best, "Detected TTM stage");

    StageDetection {
        stage,
        coaching_depth: stage.coaching_depth(),
        matched_indicators,
        scores,
    }
}
