//! GROW phase detection: Goal, Reality, Options, Will.
//!
//! Detection is module-aware: each workshop module declares the ordered subset
//! of phases it may be in, and the detector never returns a phase outside that
//! subset. Ties and zero-match results fall back to the module's first legal
//! phase.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversation::{Addressing, Message, combined_user_text};
use crate::text::{IndicatorTable, normalize};
use crate::workshop::modules::WorkshopModule;

/// The four GROW coaching phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowPhase {
    Goal,
    Reality,
    Options,
    Will,
}

impl GrowPhase {
    pub const ALL: [GrowPhase; 4] = [Self::Goal, Self::Reality, Self::Options, Self::Will];

    /// German name with its definite article.
    fn label(&self) -> &'static str {
        match self {
            Self::Goal => "das Ziel",
            Self::Reality => "die Ist-Situation",
            Self::Options => "die Optionen",
            Self::Will => "die Umsetzung",
        }
    }
}

impl std::fmt::Display for GrowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Goal => "goal",
            Self::Reality => "reality",
            Self::Options => "options",
            Self::Will => "will",
        };
        write!(f, "{s}")
    }
}

pub const GROW_INDICATOR_VERSION: &str = "grow-2024.2";

const GROW_PHRASES: &[(GrowPhase, &[&str])] = &[
    (
        GrowPhase::Goal,
        &[
            "ziel",
            "ziele",
            "ich möchte",
            "ich wünsche mir",
            "erreichen",
            "vision",
            "traum",
            "in fünf jahren",
            "my goal",
            "i want to",
            "achieve",
        ],
    ),
    (
        GrowPhase::Reality,
        &[
            "aktuell",
            "derzeit",
            "momentan",
            "zur zeit",
            "bisher",
            "im moment",
            "meine situation",
            "erfahrung",
            "arbeitslos",
            "currently",
            "right now",
            "so far",
        ],
    ),
    (
        GrowPhase::Options,
        &[
            "möglichkeit",
            "möglichkeiten",
            "alternative",
            "alternativen",
            "option",
            "optionen",
            "variante",
            "entweder",
            "ich könnte",
            "man könnte",
            "alternatively",
            "could also",
        ],
    ),
    (
        GrowPhase::Will,
        &[
            "ich werde",
            "nächster schritt",
            "nächste schritte",
            "bis ende",
            "bis zum",
            "ab morgen",
            "ab montag",
            "ich fange an",
            "verbindlich",
            "fest vor",
            "i will start",
            "next step",
            "deadline",
        ],
    ),
];

static GROW_INDICATORS: Lazy<IndicatorTable<GrowPhase>> = Lazy::new(|| {
    IndicatorTable::build(GROW_INDICATOR_VERSION, GROW_PHRASES)
        .expect("built-in GROW indicator table compiles")
});

/// The compiled built-in GROW indicator table.
pub fn grow_indicators() -> &'static IndicatorTable<GrowPhase> {
    &GROW_INDICATORS
}

/// Per-phase indicator counts over all user text.
pub fn grow_phase_scores(messages: &[Message]) -> Vec<(GrowPhase, usize)> {
    let text = normalize(&combined_user_text(messages));
    GROW_INDICATORS
        .iter()
        .map(|(phase, set)| (phase, set.count(&text)))
        .collect()
}

/// Detect the current GROW phase of `module`.
///
/// Only phases legal for the module compete. A tie for the top score or no
/// match at all resolves to the module's first legal phase.
pub fn detect_grow_phase(messages: &[Message], module: WorkshopModule) -> GrowPhase {
    let legal = module.legal_grow_phases();
    let fallback = first_legal_phase(module);

    let scores: Vec<(GrowPhase, usize)> = grow_phase_scores(messages)
        .into_iter()
        .filter(|(phase, _)| legal.contains(phase))
        .collect();

    let best = scores.iter().map(|(_, score)| *score).max().unwrap_or(0);
    if best == 0 {
        return fallback;
    }
    let mut leaders = scores.iter().filter(|(_, score)| *score == best);
    let detected = match (leaders.next(), leaders.next()) {
        (Some((phase, _)), None) => *phase,
        _ => fallback,
    };
    debug!(module = %module, phase = %detected, best, "Detected GROW phase");
    detected
}

fn first_legal_phase(module: WorkshopModule) -> GrowPhase {
    module
        .legal_grow_phases()
        .first()
        .copied()
        .unwrap_or(GrowPhase::Goal)
}

/// The phase following `current` in the module's sequence.
///
/// `None` at the module's terminal phase, or when `current` is not legal for
/// the module at all.
pub fn next_grow_phase(current: GrowPhase, module: WorkshopModule) -> Option<GrowPhase> {
    let legal = module.legal_grow_phases();
    let pos = legal.iter().position(|p| *p == current)?;
    legal.get(pos + 1).copied()
}

pub fn is_legal_phase(phase: GrowPhase, module: WorkshopModule) -> bool {
    module.legal_grow_phases().contains(&phase)
}

pub fn legal_phases(module: WorkshopModule) -> &'static [GrowPhase] {
    module.legal_grow_phases()
}

fn phase_intro(phase: GrowPhase, addressing: Addressing) -> &'static str {
    match (phase, addressing) {
        (GrowPhase::Goal, Addressing::Informal) => {
            "Lass uns zuerst klären, was du in diesem Bereich erreichen möchtest."
        }
        (GrowPhase::Goal, Addressing::Formal) => {
            "Lassen Sie uns zuerst klären, was Sie in diesem Bereich erreichen möchten."
        }
        (GrowPhase::Reality, Addressing::Informal) => {
            "Schauen wir uns an, wo du gerade stehst."
        }
        (GrowPhase::Reality, Addressing::Formal) => {
            "Schauen wir uns an, wo Sie gerade stehen."
        }
        (GrowPhase::Options, Addressing::Informal) => {
            "Welche Möglichkeiten siehst du, um dorthin zu kommen?"
        }
        (GrowPhase::Options, Addressing::Formal) => {
            "Welche Möglichkeiten sehen Sie, um dorthin zu kommen?"
        }
        (GrowPhase::Will, Addressing::Informal) => "Was wirst du konkret als Nächstes tun?",
        (GrowPhase::Will, Addressing::Formal) => "Was werden Sie konkret als Nächstes tun?",
    }
}

/// Message bridging two positions in the workshop.
///
/// Within one module the message recaps the phase just finished; across
/// modules it announces the new module.
pub fn transition_message(
    from: (WorkshopModule, GrowPhase),
    to: (WorkshopModule, GrowPhase),
    addressing: Addressing,
) -> String {
    let (from_module, from_phase) = from;
    let (to_module, to_phase) = to;
    let intro = phase_intro(to_phase, addressing);

    if from_module == to_module {
        let lead = match addressing {
            Addressing::Informal => format!(
                "Danke, {} für „{}“ haben wir jetzt gut beleuchtet.",
                from_phase.label(),
                to_module.title()
            ),
            Addressing::Formal => format!(
                "Vielen Dank, {} für „{}“ haben wir jetzt gut beleuchtet.",
                from_phase.label(),
                to_module.title()
            ),
        };
        format!("{lead} {intro}")
    } else {
        let lead = match addressing {
            Addressing::Informal => format!(
                "Super, das Modul „{}“ ist abgeschlossen. Weiter geht es mit „{}“.",
                from_module.title(),
                to_module.title()
            ),
            Addressing::Formal => format!(
                "Sehr gut, das Modul „{}“ ist abgeschlossen. Wir machen weiter mit „{}“.",
                from_module.title(),
                to_module.title()
            ),
        };
        format!("{lead} {intro}")
    }
}

/// GROW coverage of a module's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowCompleteness {
    pub is_complete: bool,
    pub covered: Vec<GrowPhase>,
    pub missing: Vec<GrowPhase>,
    /// One suggestion per missing phase, same order as `missing`.
    pub suggestions: Vec<String>,
}

fn suggestion_for(phase: GrowPhase) -> &'static str {
    match phase {
        GrowPhase::Goal => {
            "Ziel noch offen: Frage nach dem konkreten Ergebnis, das in diesem Modul erreicht werden soll."
        }
        GrowPhase::Reality => {
            "Ist-Situation noch offen: Frage nach dem aktuellen Stand, vorhandenen Ressourcen und Erfahrungen."
        }
        GrowPhase::Options => {
            "Optionen noch offen: Erkunde gemeinsam mindestens zwei alternative Wege."
        }
        GrowPhase::Will => {
            "Umsetzung noch offen: Vereinbare einen konkreten nächsten Schritt mit Termin."
        }
    }
}

/// Check which of the module's legal phases the user has touched.
pub fn validate_grow_completeness(messages: &[Message], module: WorkshopModule) -> GrowCompleteness {
    let scores = grow_phase_scores(messages);
    let mut covered = Vec::new();
    let mut missing = Vec::new();
    for phase in module.legal_grow_phases() {
        let hit = scores
            .iter()
            .any(|(p, score)| p == phase && *score > 0);
        if hit {
            covered.push(*phase);
        } else {
            missing.push(*phase);
        }
    }
    let suggestions = missing
        .iter()
        .map(|phase| suggestion_for(*phase).to_string())
        .collect();
    GrowCompleteness {
        is_complete: missing.is_empty(),
        covered,
        missing,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(user: &[&str]) -> Vec<Message> {
        user.iter()
            .flat_map(|t| [Message::assistant("Erzähl mal."), Message::user(*t)])
            .collect()
    }

    #[test]
    fn empty_history_uses_first_legal_phase() {
        assert_eq!(detect_grow_phase(&[], WorkshopModule::Intake), GrowPhase::Goal);
        assert_eq!(detect_grow_phase(&[], WorkshopModule::Strategy), GrowPhase::Reality);
        assert_eq!(detect_grow_phase(&[], WorkshopModule::Milestones), GrowPhase::Will);
    }

    #[test]
    fn detects_reality_talk() {
        let msgs = history(&["Aktuell bin ich arbeitslos, bisher war ich Koch."]);
        assert_eq!(detect_grow_phase(&msgs, WorkshopModule::Intake), GrowPhase::Reality);
    }

    #[test]
    fn restricted_module_never_leaves_its_legal_set() {
        let msgs = history(&[
            "Mein Ziel ist ein Café, das ist mein Traum und meine Vision.",
            "Aktuell bin ich arbeitslos, derzeit suche ich Möglichkeiten und Alternativen.",
        ]);
        for _ in 0..3 {
            assert_eq!(detect_grow_phase(&msgs, WorkshopModule::Milestones), GrowPhase::Will);
        }
    }

    #[test]
    fn tie_falls_back_to_first_legal_phase() {
        let msgs = history(&["Ziel und Option."]);
        assert_eq!(detect_grow_phase(&msgs, WorkshopModule::Intake), GrowPhase::Goal);
        assert_eq!(detect_grow_phase(&msgs, WorkshopModule::Strategy), GrowPhase::Options);
    }

    #[test]
    fn assistant_text_is_ignored() {
        let msgs = vec![Message::assistant("Welche Optionen und Alternativen siehst du?")];
        assert_eq!(detect_grow_phase(&msgs, WorkshopModule::Intake), GrowPhase::Goal);
    }

    #[test]
    fn next_phase_walks_module_sequence() {
        assert_eq!(next_grow_phase(GrowPhase::Goal, WorkshopModule::Intake), Some(GrowPhase::Reality));
        assert_eq!(next_grow_phase(GrowPhase::Will, WorkshopModule::Intake), None);
        assert_eq!(next_grow_phase(GrowPhase::Goal, WorkshopModule::Kpi), Some(GrowPhase::Will));
        assert_eq!(next_grow_phase(GrowPhase::Goal, WorkshopModule::Milestones), None);
        assert_eq!(next_grow_phase(GrowPhase::Will, WorkshopModule::Milestones), None);
    }

    #[test]
    fn legality_checks() {
        assert!(is_legal_phase(GrowPhase::Options, WorkshopModule::Market));
        assert!(!is_legal_phase(GrowPhase::Goal, WorkshopModule::Strategy));
        assert_eq!(legal_phases(WorkshopModule::Market).len(), 4);
    }

    #[test]
    fn transition_message_respects_addressing() {
        let informal = transition_message(
            (WorkshopModule::Market, GrowPhase::Goal),
            (WorkshopModule::Market, GrowPhase::Reality),
            Addressing::Informal,
        );
        assert!(informal.contains("du gerade stehst"));
        let formal = transition_message(
            (WorkshopModule::Market, GrowPhase::Goal),
            (WorkshopModule::Market, GrowPhase::Reality),
            Addressing::Formal,
        );
        assert!(formal.contains("Sie gerade stehen"));
    }

    #[test]
    fn transition_names_phase_with_its_article() {
        let msg = transition_message(
            (WorkshopModule::Intake, GrowPhase::Goal),
            (WorkshopModule::Intake, GrowPhase::Will),
            Addressing::Informal,
        );
        assert!(msg.starts_with("Danke, das Ziel für „Gründerprofil“"));

        let msg = transition_message(
            (WorkshopModule::Market, GrowPhase::Reality),
            (WorkshopModule::Market, GrowPhase::Options),
            Addressing::Formal,
        );
        assert!(msg.starts_with("Vielen Dank, die Ist-Situation für"));
    }

    #[test]
    fn transition_across_modules_names_both() {
        let msg = transition_message(
            (WorkshopModule::Finance, GrowPhase::Will),
            (WorkshopModule::Strategy, GrowPhase::Reality),
            Addressing::Informal,
        );
        assert!(msg.contains("Finanzplanung"));
        assert!(msg.contains("Strategie"));
    }

    #[test]
    fn completeness_reports_missing_legal_phases() {
        let msgs = history(&["Mein Ziel ist klar.", "Aktuell habe ich wenig Kapital."]);
        let report = validate_grow_completeness(&msgs, WorkshopModule::Intake);
        assert!(!report.is_complete);
        assert_eq!(report.covered, vec![GrowPhase::Goal, GrowPhase::Reality]);
        assert_eq!(report.missing, vec![GrowPhase::Options, GrowPhase::Will]);
        assert_eq!(report.suggestions.len(), 2);
        assert!(report.suggestions[1].contains("nächsten Schritt"));
    }

    #[test]
    fn completeness_only_considers_legal_phases() {
        let msgs = history(&["Ich werde ab Montag den nächsten Schritt gehen."]);
        let report = validate_grow_completeness(&msgs, WorkshopModule::Milestones);
        assert!(report.is_complete);
        assert!(report.missing.is_empty());
    }
}
