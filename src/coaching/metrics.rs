//! Conversation-quality metrics.
//!
//! `analyze_message` turns one message into metric deltas; `apply_deltas` is
//! the pure reducer that folds them into a new `CoachingMetrics` value and
//! recomputes the derived ratios. Ratios are never stored independently of
//! the counts they come from.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::conversation::Role;
use crate::text::{IndicatorSet, IndicatorTable, normalize};

/// A countable conversation-quality signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Autonomy,
    Competence,
    Relatedness,
    OpenQuestion,
    ClosedQuestion,
    Empathy,
    ChangeTalk,
    SustainTalk,
    AdviceGiving,
    LeadingQuestion,
    ReflectiveSummary,
}

impl MetricKind {
    /// Which speaker this signal is measured on.
    pub fn eligible_role(&self) -> Role {
        match self {
            Self::ChangeTalk | Self::SustainTalk => Role::User,
            _ => Role::Assistant,
        }
    }

    pub fn is_anti_pattern(&self) -> bool {
        matches!(self, Self::AdviceGiving | Self::LeadingQuestion)
    }
}

/// One increment produced by a single indicator match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub kind: MetricKind,
    pub amount: u32,
}

impl MetricDelta {
    pub fn one(kind: MetricKind) -> Self {
        Self { kind, amount: 1 }
    }
}

/// Raw counters. The only part of the metrics that is ever persisted as
/// source of truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricCounts {
    pub autonomy_instances: u32,
    pub competence_instances: u32,
    pub relatedness_instances: u32,
    pub open_questions: u32,
    pub closed_questions: u32,
    pub empathy_markers: u32,
    pub change_talk: u32,
    pub sustain_talk: u32,
    pub advice_giving: u32,
    pub leading_questions: u32,
    pub reflective_summaries: u32,
}

impl MetricCounts {
    fn slot(&mut self, kind: MetricKind) -> &mut u32 {
        match kind {
            MetricKind::Autonomy => &mut self.autonomy_instances,
            MetricKind::Competence => &mut self.competence_instances,
            MetricKind::Relatedness => &mut self.relatedness_instances,
            MetricKind::OpenQuestion => &mut self.open_questions,
            MetricKind::ClosedQuestion => &mut self.closed_questions,
            MetricKind::Empathy => &mut self.empathy_markers,
            MetricKind::ChangeTalk => &mut self.change_talk,
            MetricKind::SustainTalk => &mut self.sustain_talk,
            MetricKind::AdviceGiving => &mut self.advice_giving,
            MetricKind::LeadingQuestion => &mut self.leading_questions,
            MetricKind::ReflectiveSummary => &mut self.reflective_summaries,
        }
    }

    pub fn anti_patterns(&self) -> u32 {
        self.advice_giving + self.leading_questions
    }
}

/// Counters plus their derived ratios.
///
/// Deserialization goes through `MetricCounts`, so stored ratios are ignored
/// and recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MetricCounts")]
pub struct CoachingMetrics {
    #[serde(flatten)]
    counts: MetricCounts,
    open_question_ratio: f64,
    change_talk_ratio: f64,
}

impl From<MetricCounts> for CoachingMetrics {
    fn from(counts: MetricCounts) -> Self {
        Self::from_counts(counts)
    }
}

impl CoachingMetrics {
    pub fn from_counts(counts: MetricCounts) -> Self {
        let questions = counts.open_questions + counts.closed_questions;
        let open_question_ratio = if questions == 0 {
            0.0
        } else {
            f64::from(counts.open_questions) / f64::from(questions)
        };
        let change_talk_ratio = if counts.sustain_talk == 0 {
            0.0
        } else {
            f64::from(counts.change_talk) / f64::from(counts.sustain_talk)
        };
        Self {
            counts,
            open_question_ratio,
            change_talk_ratio,
        }
    }

    pub fn counts(&self) -> &MetricCounts {
        &self.counts
    }

    /// `open / (open + closed)`, 0 when no questions were asked.
    pub fn open_question_ratio(&self) -> f64 {
        self.open_question_ratio
    }

    /// `change_talk / sustain_talk`, 0 when there is no sustain talk.
    pub fn change_talk_ratio(&self) -> f64 {
        self.change_talk_ratio
    }

    /// Fold deltas into a new value; `self` is left untouched.
    pub fn apply_deltas(&self, deltas: &[MetricDelta]) -> Self {
        let mut counts = self.counts;
        for delta in deltas {
            let slot = counts.slot(delta.kind);
            *slot = slot.saturating_add(delta.amount);
        }
        Self::from_counts(counts)
    }

    /// Composite quality score in `[0, 100]`.
    pub fn score(&self) -> u8 {
        self.score_breakdown().total
    }

    pub fn score_breakdown(&self) -> ScoreBreakdown {
        ScoreBreakdown::compute(self)
    }
}

// ── Scoring ─────────────────────────────────────────────────────────

const SDT_WEIGHT: f64 = 30.0;
const QUESTION_WEIGHT: f64 = 25.0;
const EMPATHY_WEIGHT: f64 = 20.0;
const CHANGE_TALK_WEIGHT: f64 = 25.0;

/// Instances per SDT need that earn the full share.
const SDT_TARGET_PER_NEED: f64 = 2.0;
const EMPATHY_TARGET: f64 = 2.0;
const OPEN_RATIO_TARGET: f64 = 0.7;
/// change/sustain ratio that earns the full change-talk share.
const CHANGE_RATIO_TARGET: f64 = 2.0;
/// Points deducted per advice-giving or leading-question instance.
pub const ANTI_PATTERN_PENALTY: f64 = 5.0;

/// Sub-scores of the composite quality score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub sdt_coverage: f64,
    pub question_balance: f64,
    pub empathy: f64,
    pub change_talk: f64,
    pub anti_pattern_penalty: f64,
    pub total: u8,
}

impl ScoreBreakdown {
    fn compute(metrics: &CoachingMetrics) -> Self {
        let c = metrics.counts();

        let need_share = |count: u32| (f64::from(count) / SDT_TARGET_PER_NEED).min(1.0);
        let sdt_coverage = (need_share(c.autonomy_instances)
            + need_share(c.competence_instances)
            + need_share(c.relatedness_instances))
            / 3.0
            * SDT_WEIGHT;

        let question_balance = if c.open_questions + c.closed_questions == 0 {
            0.0
        } else {
            (metrics.open_question_ratio() / OPEN_RATIO_TARGET).min(1.0) * QUESTION_WEIGHT
        };

        let empathy = (f64::from(c.empathy_markers) / EMPATHY_TARGET).min(1.0) * EMPATHY_WEIGHT;

        let change_share = match (c.change_talk, c.sustain_talk) {
            (0, 0) => 0.5,
            (_, 0) => 1.0,
            _ => (metrics.change_talk_ratio() / CHANGE_RATIO_TARGET).min(1.0),
        };
        let change_talk = change_share * CHANGE_TALK_WEIGHT;

        let anti_pattern_penalty = f64::from(c.anti_patterns()) * ANTI_PATTERN_PENALTY;

        let raw = sdt_coverage + question_balance + empathy + change_talk - anti_pattern_penalty;
        let total = raw.round().clamp(0.0, 100.0) as u8;

        Self {
            sdt_coverage,
            question_balance,
            empathy,
            change_talk,
            anti_pattern_penalty,
            total,
        }
    }
}

// ── Pattern catalogs ────────────────────────────────────────────────

pub const METRIC_INDICATOR_VERSION: &str = "metrics-2024.4";

/// Whole-message indicator phrases. Question kinds are handled separately by
/// sentence-starter classification.
const METRIC_PHRASES: &[(MetricKind, &[&str])] = &[
    (
        MetricKind::Empathy,
        &[
            "ich verstehe",
            "kann ich gut verstehen",
            "verständlich",
            "nachvollziehbar",
            "das klingt",
            "das ist nicht leicht",
            "das ist völlig normal",
            "i understand",
            "that sounds",
        ],
    ),
    (
        MetricKind::Autonomy,
        &[
            "was denkst du",
            "was meinst du",
            "wie siehst du",
            "du entscheidest",
            "deine entscheidung",
            "wie möchtest du",
            "was denken sie",
            "wie sehen sie",
            "sie entscheiden",
            "ihre entscheidung",
            "your choice",
            "what do you think",
            "you decide",
        ],
    ),
    (
        MetricKind::Competence,
        &[
            "du hast bereits",
            "das hast du gut",
            "deine erfahrung",
            "das schaffst du",
            "deine stärke",
            "deine stärken",
            "gut gemacht",
            "sie haben bereits",
            "ihre erfahrung",
            "well done",
            "you already",
        ],
    ),
    (
        MetricKind::Relatedness,
        &[
            "gemeinsam",
            "lass uns",
            "lassen sie uns",
            "ich begleite",
            "ich bin für dich da",
            "together",
        ],
    ),
    (
        MetricKind::AdviceGiving,
        &[
            "du solltest",
            "du musst",
            "sie sollten",
            "sie müssen",
            "ich empfehle",
            "mein rat",
            "am besten machst du",
            "ich würde dir raten",
            "you should",
            "i recommend",
        ],
    ),
    (
        MetricKind::ReflectiveSummary,
        &[
            "wenn ich dich richtig verstehe",
            "wenn ich sie richtig verstehe",
            "lass mich zusammenfassen",
            "fassen wir zusammen",
            "zusammengefasst",
            "du sagst also",
            "if i understand you correctly",
            "to summarize",
        ],
    ),
    (
        MetricKind::ChangeTalk,
        &[
            "ich will",
            "ich möchte",
            "ich werde",
            "ich kann das",
            "ich schaffe das",
            "bin bereit",
            "freue mich",
            "unbedingt",
            "i want",
            "i will",
        ],
    ),
    (
        MetricKind::SustainTalk,
        &[
            "ich kann nicht",
            "zu riskant",
            "zu teuer",
            "keine zeit",
            "lieber nicht",
            "schaffe ich nicht",
            "ich weiß nicht ob",
            "i can't",
            "too risky",
        ],
    ),
];

const LEADING_QUESTION_PHRASES: &[&str] = &[
    "meinst du nicht auch",
    "findest du nicht",
    "wäre es nicht",
    "ist es nicht so",
    "solltest du nicht",
    "meinen sie nicht auch",
    "sollten sie nicht",
    "don't you think",
    "wouldn't it be",
];

/// Words that open an open (W-) question.
const OPEN_STARTERS: &[&str] = &[
    "was", "wie", "warum", "wieso", "weshalb", "welche", "welcher", "welches", "welchen", "wo",
    "woran", "wodurch", "womit", "wofür", "wohin", "woher", "wann", "wer", "wen", "wem",
    "inwiefern", "inwieweit", "what", "how", "why", "which", "where", "when", "who",
];

/// Conjunctions skipped before reading the starter word.
const QUESTION_FILLERS: &[&str] = &["und", "also", "aber", "und,", "and", "so", "but"];

static METRIC_INDICATORS: Lazy<IndicatorTable<MetricKind>> = Lazy::new(|| {
    IndicatorTable::build(METRIC_INDICATOR_VERSION, METRIC_PHRASES)
        .expect("built-in metric indicator table compiles")
});

static LEADING_QUESTIONS: Lazy<IndicatorSet> = Lazy::new(|| {
    IndicatorSet::new("leading_question", LEADING_QUESTION_PHRASES)
        .expect("built-in leading-question table compiles")
});

static OPEN_STARTER_WORDS: Lazy<Vec<String>> =
    Lazy::new(|| OPEN_STARTERS.iter().map(|w| normalize(w)).collect());

/// The compiled built-in whole-message metric catalog.
pub fn metric_indicators() -> &'static IndicatorTable<MetricKind> {
    &METRIC_INDICATORS
}

/// Question sentences (ending in `?`) of already-normalized text.
fn question_sentences(normalized: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, ch) in normalized.char_indices() {
        match ch {
            '?' => {
                let sentence = normalized[start..idx].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = idx + ch.len_utf8();
            }
            '.' | '!' | '\n' | ';' | ':' => start = idx + ch.len_utf8(),
            _ => {}
        }
    }
    out
}

fn starter_word(sentence: &str) -> Option<&str> {
    sentence
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .find(|w| !QUESTION_FILLERS.contains(w))
}

/// Classify one question sentence.
fn classify_question(sentence: &str) -> MetricKind {
    if LEADING_QUESTIONS.is_match(sentence) {
        return MetricKind::LeadingQuestion;
    }
    match starter_word(sentence) {
        Some(word) if OPEN_STARTER_WORDS.iter().any(|w| w == word) => MetricKind::OpenQuestion,
        _ => MetricKind::ClosedQuestion,
    }
}

/// Analyze a single message into metric deltas.
///
/// Categories are not mutually exclusive and each indicator occurrence yields
/// its own delta. Only categories eligible for `role` are considered.
pub fn analyze_message(text: &str, role: Role) -> Vec<MetricDelta> {
    let normalized = normalize(text);
    let mut deltas = Vec::new();

    if role == Role::Assistant {
        for sentence in question_sentences(&normalized) {
            deltas.push(MetricDelta::one(classify_question(sentence)));
        }
    }

    for (kind, set) in METRIC_INDICATORS.iter() {
        if kind.eligible_role() != role {
            continue;
        }
        let hits = set.count(&normalized);
        deltas.extend(std::iter::repeat_n(MetricDelta::one(kind), hits));
    }

    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(deltas: &[MetricDelta], kind: MetricKind) -> usize {
        deltas.iter().filter(|d| d.kind == kind).count()
    }

    #[test]
    fn two_open_questions_no_anti_patterns() {
        let deltas = analyze_message("Was denkst du? Wie würdest du vorgehen?", Role::Assistant);
        assert_eq!(count(&deltas, MetricKind::OpenQuestion), 2);
        assert_eq!(count(&deltas, MetricKind::ClosedQuestion), 0);
        assert_eq!(count(&deltas, MetricKind::AdviceGiving), 0);
        assert_eq!(count(&deltas, MetricKind::LeadingQuestion), 0);
    }

    #[test]
    fn closed_and_leading_questions() {
        let deltas = analyze_message(
            "Hast du schon einen Standort? Meinst du nicht auch, dass das zu teuer ist?",
            Role::Assistant,
        );
        assert_eq!(count(&deltas, MetricKind::ClosedQuestion), 1);
        assert_eq!(count(&deltas, MetricKind::LeadingQuestion), 1);
        assert_eq!(count(&deltas, MetricKind::OpenQuestion), 0);
    }

    #[test]
    fn filler_words_are_skipped() {
        let deltas = analyze_message("Und warum gerade jetzt?", Role::Assistant);
        assert_eq!(count(&deltas, MetricKind::OpenQuestion), 1);
    }

    #[test]
    fn categories_overlap_and_repeat() {
        let deltas = analyze_message(
            "Ich verstehe. Das klingt schwer, ich verstehe das. Du solltest gemeinsam planen, du solltest.",
            Role::Assistant,
        );
        assert_eq!(count(&deltas, MetricKind::Empathy), 3);
        assert_eq!(count(&deltas, MetricKind::AdviceGiving), 2);
        assert_eq!(count(&deltas, MetricKind::Relatedness), 1);
    }

    #[test]
    fn roles_gate_categories() {
        let user = analyze_message("Ich will das unbedingt, aber es ist zu riskant. Was denkst du?", Role::User);
        assert_eq!(count(&user, MetricKind::ChangeTalk), 2);
        assert_eq!(count(&user, MetricKind::SustainTalk), 1);
        assert_eq!(count(&user, MetricKind::Autonomy), 0);
        assert_eq!(count(&user, MetricKind::OpenQuestion), 0);

        let assistant = analyze_message("Ich will dir helfen.", Role::Assistant);
        assert_eq!(count(&assistant, MetricKind::ChangeTalk), 0);
    }

    #[test]
    fn ratios_are_zero_on_empty_denominators() {
        let m = CoachingMetrics::default();
        assert_eq!(m.open_question_ratio(), 0.0);
        assert_eq!(m.change_talk_ratio(), 0.0);

        let only_change = CoachingMetrics::from_counts(MetricCounts {
            change_talk: 4,
            ..Default::default()
        });
        assert_eq!(only_change.change_talk_ratio(), 0.0);
    }

    #[test]
    fn reducer_recomputes_ratios_without_mutating_input() {
        let before = CoachingMetrics::default();
        let after = before.apply_deltas(&[
            MetricDelta::one(MetricKind::OpenQuestion),
            MetricDelta::one(MetricKind::OpenQuestion),
            MetricDelta::one(MetricKind::OpenQuestion),
            MetricDelta::one(MetricKind::ClosedQuestion),
            MetricDelta::one(MetricKind::ChangeTalk),
            MetricDelta::one(MetricKind::ChangeTalk),
            MetricDelta::one(MetricKind::SustainTalk),
        ]);
        assert_eq!(before, CoachingMetrics::default());
        assert!((after.open_question_ratio() - 0.75).abs() < f64::EPSILON);
        assert!((after.change_talk_ratio() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn open_ratio_stays_in_unit_interval() {
        for open in 0..5u32 {
            for closed in 0..5u32 {
                let m = CoachingMetrics::from_counts(MetricCounts {
                    open_questions: open,
                    closed_questions: closed,
                    ..Default::default()
                });
                let r = m.open_question_ratio();
                assert!((0.0..=1.0).contains(&r), "{open}/{closed} -> {r}");
            }
        }
    }

    #[test]
    fn score_is_clamped() {
        let awful = CoachingMetrics::from_counts(MetricCounts {
            advice_giving: 40,
            leading_questions: 10,
            ..Default::default()
        });
        assert_eq!(awful.score(), 0);

        let great = CoachingMetrics::from_counts(MetricCounts {
            autonomy_instances: 5,
            competence_instances: 5,
            relatedness_instances: 5,
            open_questions: 9,
            closed_questions: 1,
            empathy_markers: 4,
            change_talk: 6,
            sustain_talk: 1,
            ..Default::default()
        });
        assert_eq!(great.score(), 100);
    }

    #[test]
    fn breakdown_exposes_penalty() {
        let m = CoachingMetrics::from_counts(MetricCounts {
            empathy_markers: 1,
            advice_giving: 1,
            leading_questions: 1,
            ..Default::default()
        });
        let b = m.score_breakdown();
        assert_eq!(b.anti_pattern_penalty, 10.0);
        assert_eq!(b.empathy, 10.0);
        assert_eq!(b.change_talk, 12.5);
        assert_eq!(b.sdt_coverage, 0.0);
        // 10 + 12.5 - 10 = 12.5 -> 13
        assert_eq!(b.total, 13);
    }

    #[test]
    fn deserialization_recomputes_ratios() {
        let json = r#"{"open_questions": 1, "closed_questions": 1, "open_question_ratio": 0.99}"#;
        let m: CoachingMetrics = serde_json::from_str(json).unwrap();
        assert!((m.open_question_ratio() - 0.5).abs() < f64::EPSILON);
        let out = serde_json::to_value(m).unwrap();
        assert_eq!(out["open_question_ratio"], 0.5);
        assert_eq!(out["open_questions"], 1);
    }
}
