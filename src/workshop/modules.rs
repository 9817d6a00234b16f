//! The ten workshop modules that make up a business plan conversation.

use serde::{Deserialize, Serialize};

use crate::coaching::grow::GrowPhase;

/// One step of the ten-step workshop.
///
/// Modules run in order; module 0 (intake) opens the workshop and creates the
/// coaching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkshopModule {
    Intake,
    BusinessModel,
    Company,
    Market,
    Marketing,
    Finance,
    Strategy,
    Milestones,
    Kpi,
    Summary,
}

const FULL_GROW: &[GrowPhase] = &[
    GrowPhase::Goal,
    GrowPhase::Reality,
    GrowPhase::Options,
    GrowPhase::Will,
];

impl WorkshopModule {
    /// All modules in workshop order.
    pub const ALL: [WorkshopModule; 10] = [
        Self::Intake,
        Self::BusinessModel,
        Self::Company,
        Self::Market,
        Self::Marketing,
        Self::Finance,
        Self::Strategy,
        Self::Milestones,
        Self::Kpi,
        Self::Summary,
    ];

    /// Zero-based position in the workshop.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The module that follows this one, if any.
    pub fn next(&self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Ordered GROW phases this module may be in.
    pub fn legal_grow_phases(&self) -> &'static [GrowPhase] {
        match self {
            Self::Strategy => &[GrowPhase::Reality, GrowPhase::Options],
            Self::Milestones => &[GrowPhase::Will],
            Self::Kpi => &[GrowPhase::Goal, GrowPhase::Will],
            Self::Summary => &[GrowPhase::Reality, GrowPhase::Will],
            _ => FULL_GROW,
        }
    }

    /// Human-readable (German) title used in transition messages.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Intake => "Gründerprofil",
            Self::BusinessModel => "Geschäftsmodell",
            Self::Company => "Unternehmen",
            Self::Market => "Markt & Wettbewerb",
            Self::Marketing => "Marketing & Vertrieb",
            Self::Finance => "Finanzplanung",
            Self::Strategy => "Strategie",
            Self::Milestones => "Meilensteine",
            Self::Kpi => "Kennzahlen",
            Self::Summary => "Zusammenfassung",
        }
    }
}

impl std::fmt::Display for WorkshopModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Intake => "intake",
            Self::BusinessModel => "business_model",
            Self::Company => "company",
            Self::Market => "market",
            Self::Marketing => "marketing",
            Self::Finance => "finance",
            Self::Strategy => "strategy",
            Self::Milestones => "milestones",
            Self::Kpi => "kpi",
            Self::Summary => "summary",
        };
        write!(f, "{s}")
    }
}
