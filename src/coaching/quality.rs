//! Quality validator: turns metrics into corrective guidance.
//!
//! Every rule is evaluated independently and several may fire on the same
//! turn. The resulting corrections are always sorted high → medium → low so
//! callers can take the first one or join the important ones.

use serde::{Deserialize, Serialize};

use super::metrics::CoachingMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    Autonomy,
    Empathy,
    AdviceGiving,
    LeadingQuestions,
    Summary,
    OpenQuestions,
}

/// A piece of guidance to splice into the next system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub kind: CorrectionKind,
    pub priority: CorrectionPriority,
    pub prompt: String,
}

/// Conversational counters the validator needs besides the metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityContext {
    pub exchange_count: u32,
    /// An emotion was flagged in the current turn.
    pub emotion_detected: bool,
    pub exchanges_since_last_summary: u32,
}

/// Tunable thresholds for the correction rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Minimum score for a conversation to count as acceptable.
    pub acceptance_score: u8,
    pub autonomy_min: u32,
    /// Exchanges before missing autonomy support is flagged.
    pub autonomy_grace_exchanges: u32,
    /// Exchanges before a lack of empathy is flagged without an emotion.
    pub empathy_grace_exchanges: u32,
    pub advice_max: u32,
    pub leading_max: u32,
    pub summary_interval: u32,
    pub open_question_target: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            acceptance_score: 75,
            autonomy_min: 2,
            autonomy_grace_exchanges: 3,
            empathy_grace_exchanges: 6,
            advice_max: 2,
            leading_max: 2,
            summary_interval: 10,
            open_question_target: 0.6,
        }
    }
}

/// Full validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: u8,
    pub is_acceptable: bool,
    pub corrections: Vec<Correction>,
}

impl QualityReport {
    /// Prompt of the highest-priority correction, if any.
    pub fn top_prompt(&self) -> Option<String> {
        self.corrections.first().map(|c| c.prompt.clone())
    }

    /// All high and medium prompts joined, `None` if only low-priority
    /// corrections (or none) fired.
    pub fn combined_prompt(&self) -> Option<String> {
        let prompts: Vec<&str> = self
            .corrections
            .iter()
            .filter(|c| c.priority != CorrectionPriority::Low)
            .map(|c| c.prompt.as_str())
            .collect();
        if prompts.is_empty() {
            None
        } else {
            Some(prompts.join("\n\n"))
        }
    }
}

/// Run all correction rules against the current metrics.
pub fn validate_quality(
    metrics: &CoachingMetrics,
    context: &QualityContext,
    thresholds: &QualityThresholds,
) -> QualityReport {
    let counts = metrics.counts();
    let mut corrections = Vec::new();

    if context.exchange_count > thresholds.autonomy_grace_exchanges
        && counts.autonomy_instances < thresholds.autonomy_min
    {
        let priority = if counts.autonomy_instances == 0 {
            CorrectionPriority::High
        } else {
            CorrectionPriority::Medium
        };
        corrections.push(Correction {
            kind: CorrectionKind::Autonomy,
            priority,
            prompt: "KORREKTUR AUTONOMIE: Stärke die Eigenverantwortung des Gründers. \
                     Frage nach seiner eigenen Einschätzung (z.B. „Was denkst du selbst?“) \
                     und betone, dass die Entscheidung bei ihm liegt."
                .to_string(),
        });
    }

    if context.emotion_detected && counts.empathy_markers == 0 {
        corrections.push(Correction {
            kind: CorrectionKind::Empathy,
            priority: CorrectionPriority::High,
            prompt: "KORREKTUR EMPATHIE: Der Gründer hat gerade ein Gefühl geäußert. \
                     Greife es zuerst empathisch auf und spiegle es, bevor du mit \
                     inhaltlichen Fragen weitermachst."
                .to_string(),
        });
    } else if !context.emotion_detected
        && context.exchange_count > thresholds.empathy_grace_exchanges
        && counts.empathy_markers == 0
    {
        corrections.push(Correction {
            kind: CorrectionKind::Empathy,
            priority: CorrectionPriority::Low,
            prompt: "HINWEIS EMPATHIE: Zeige gelegentlich Verständnis für die Situation \
                     des Gründers."
                .to_string(),
        });
    }

    if counts.advice_giving > thresholds.advice_max {
        corrections.push(Correction {
            kind: CorrectionKind::AdviceGiving,
            priority: CorrectionPriority::Medium,
            prompt: "KORREKTUR RATSCHLÄGE: Du hast zu oft direkte Ratschläge gegeben. \
                     Stelle stattdessen Fragen, die den Gründer eigene Lösungen finden lassen."
                .to_string(),
        });
    }

    if counts.leading_questions > thresholds.leading_max {
        corrections.push(Correction {
            kind: CorrectionKind::LeadingQuestions,
            priority: CorrectionPriority::Medium,
            prompt: "KORREKTUR SUGGESTIVFRAGEN: Vermeide Fragen, die eine Antwort nahelegen. \
                     Formuliere neutral und offen."
                .to_string(),
        });
    }

    if context.exchanges_since_last_summary > thresholds.summary_interval {
        corrections.push(Correction {
            kind: CorrectionKind::Summary,
            priority: CorrectionPriority::Medium,
            prompt: "KORREKTUR ZUSAMMENFASSUNG: Fasse das bisher Besprochene in zwei bis drei \
                     Sätzen reflektierend zusammen und frage, ob du es richtig verstanden hast."
                .to_string(),
        });
    }

    let questions = counts.open_questions + counts.closed_questions;
    if questions > 0 && metrics.open_question_ratio() < thresholds.open_question_target {
        corrections.push(Correction {
            kind: CorrectionKind::OpenQuestions,
            priority: CorrectionPriority::Low,
            prompt: "HINWEIS FRAGETECHNIK: Nutze mehr offene W-Fragen (Was, Wie, Welche) \
                     statt Ja/Nein-Fragen."
                .to_string(),
        });
    }

    corrections.sort_by_key(|c| c.priority);

    let score = metrics.score();
    QualityReport {
        score,
        is_acceptable: score >= thresholds.acceptance_score,
        corrections,
    }
}

/// Prompt of the single highest-priority correction.
pub fn top_correction_prompt(
    metrics: &CoachingMetrics,
    context: &QualityContext,
    thresholds: &QualityThresholds,
) -> Option<String> {
    validate_quality(metrics, context, thresholds).top_prompt()
}

/// Joined prompts of all medium and high corrections.
pub fn combined_correction_prompt(
    metrics: &CoachingMetrics,
    context: &QualityContext,
    thresholds: &QualityThresholds,
) -> Option<String> {
    validate_quality(metrics, context, thresholds).combined_prompt()
}
