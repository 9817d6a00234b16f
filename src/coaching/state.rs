//! Coaching state: the per-session aggregate and its reducer.
//!
//! `CoachingState` is only ever changed through `CoachingState::apply`, which
//! takes a named `CoachingAction` and returns a new snapshot. History lists
//! (stages, emotions) are append-only; beliefs are unique per type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::grow::GrowPhase;
use super::metrics::{CoachingMetrics, MetricDelta};
use super::signals::{Emotion, LimitingBelief};
use super::stage::Stage;
use crate::workshop::modules::WorkshopModule;

/// One explicit stage assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedBelief {
    pub belief: LimitingBelief,
    pub identified_at: DateTime<Utc>,
    pub reframed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reframed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub emotion: Emotion,
    pub detected_at: DateTime<Utc>,
    pub addressed: bool,
}

/// Exchange counters driving the grace periods and summary rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeCounters {
    pub exchange_count: u32,
    pub exchanges_since_summary: u32,
}

/// Self-determination-theory support counts, read from the metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdtCounters {
    pub autonomy: u32,
    pub competence: u32,
    pub relatedness: u32,
}

/// A named state mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CoachingAction {
    /// Append a stage to the history and make it current.
    SetStage {
        stage: Stage,
        trigger: Option<String>,
    },
    /// Move the workshop to another module.
    SetModule(WorkshopModule),
    /// Record the GROW phase of a module. Phases outside the module's legal
    /// set are ignored.
    SetGrowPhase {
        module: WorkshopModule,
        phase: GrowPhase,
    },
    ApplyMetricDeltas(Vec<MetricDelta>),
    /// Identify a limiting belief. Repeated identification is a no-op.
    AddBelief(LimitingBelief),
    ReframeBelief(LimitingBelief),
    RecordEmotion(Emotion),
    /// Mark the most recent emotion as addressed.
    AddressLastEmotion,
    /// Merge newly discovered strengths by ordered set union.
    AddStrengths(Vec<String>),
    /// Count one completed exchange.
    RecordExchange,
    /// A reflective summary was given.
    ResetSummaryCounter,
}

/// Aggregate coaching state of one workshop session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingState {
    current_stage: Stage,
    stage_history: Vec<StageRecord>,
    current_module: WorkshopModule,
    current_grow_phase: GrowPhase,
    module_grow_phases: BTreeMap<WorkshopModule, GrowPhase>,
    metrics: CoachingMetrics,
    beliefs: Vec<IdentifiedBelief>,
    emotions: Vec<EmotionRecord>,
    strengths: Vec<String>,
    exchanges: ExchangeCounters,
    last_updated_at: DateTime<Utc>,
}

impl Default for CoachingState {
    fn default() -> Self {
        Self::new()
    }
}

impl CoachingState {
    /// Canonical zero-value state at the start of module 0.
    pub fn new() -> Self {
        let module = WorkshopModule::Intake;
        Self {
            current_stage: Stage::Contemplation,
            stage_history: Vec::new(),
            current_module: module,
            current_grow_phase: first_phase(module),
            module_grow_phases: BTreeMap::new(),
            metrics: CoachingMetrics::default(),
            beliefs: Vec::new(),
            emotions: Vec::new(),
            strengths: Vec::new(),
            exchanges: ExchangeCounters::default(),
            last_updated_at: Utc::now(),
        }
    }

    /// Discard all progress. Only called on explicit user request.
    pub fn reset(&self) -> Self {
        Self::new()
    }

    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    pub fn stage_history(&self) -> &[StageRecord] {
        &self.stage_history
    }

    pub fn current_module(&self) -> WorkshopModule {
        self.current_module
    }

    pub fn current_grow_phase(&self) -> GrowPhase {
        self.current_grow_phase
    }

    /// GROW phase of `module`, defaulting to its first legal phase.
    pub fn grow_phase_of(&self, module: WorkshopModule) -> GrowPhase {
        self.module_grow_phases
            .get(&module)
            .copied()
            .unwrap_or_else(|| first_phase(module))
    }

    pub fn metrics(&self) -> &CoachingMetrics {
        &self.metrics
    }

    pub fn sdt_counters(&self) -> SdtCounters {
        let c = self.metrics.counts();
        SdtCounters {
            autonomy: c.autonomy_instances,
            competence: c.competence_instances,
            relatedness: c.relatedness_instances,
        }
    }

    pub fn beliefs(&self) -> &[IdentifiedBelief] {
        &self.beliefs
    }

    pub fn emotions(&self) -> &[EmotionRecord] {
        &self.emotions
    }

    /// Whether the latest emotion is still waiting for an empathic response.
    pub fn has_unaddressed_emotion(&self) -> bool {
        self.emotions.last().is_some_and(|e| !e.addressed)
    }

    pub fn strengths(&self) -> &[String] {
        &self.strengths
    }

    pub fn exchanges(&self) -> ExchangeCounters {
        self.exchanges
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    /// Apply one action, returning the next snapshot.
    pub fn apply(&self, action: CoachingAction) -> Self {
        let now = Utc::now();
        let mut next = self.clone();
        match action {
            CoachingAction::SetStage { stage, trigger } => {
                next.current_stage = stage;
                next.stage_history.push(StageRecord {
                    stage,
                    detected_at: now,
                    trigger,
                });
            }
            CoachingAction::SetModule(module) => {
                next.current_module = module;
                next.current_grow_phase = next.grow_phase_of(module);
            }
            CoachingAction::SetGrowPhase { module, phase } => {
                if module.legal_grow_phases().contains(&phase) {
                    next.module_grow_phases.insert(module, phase);
                    if module == next.current_module {
                        next.current_grow_phase = phase;
                    }
                } else {
                    debug!(module = %module, phase = %phase, "Ignoring illegal GROW phase");
                }
            }
            CoachingAction::ApplyMetricDeltas(deltas) => {
                next.metrics = next.metrics.apply_deltas(&deltas);
            }
            CoachingAction::AddBelief(belief) => {
                if !next.beliefs.iter().any(|b| b.belief == belief) {
                    next.beliefs.push(IdentifiedBelief {
                        belief,
                        identified_at: now,
                        reframed: false,
                        reframed_at: None,
                    });
                }
            }
            CoachingAction::ReframeBelief(belief) => {
                if let Some(entry) = next
                    .beliefs
                    .iter_mut()
                    .find(|b| b.belief == belief && !b.reframed)
                {
                    entry.reframed = true;
                    entry.reframed_at = Some(now);
                }
            }
            CoachingAction::RecordEmotion(emotion) => {
                next.emotions.push(EmotionRecord {
                    emotion,
                    detected_at: now,
                    addressed: false,
                });
            }
            CoachingAction::AddressLastEmotion => {
                if let Some(last) = next.emotions.last_mut() {
                    last.addressed = true;
                }
            }
            CoachingAction::AddStrengths(strengths) => {
                for strength in strengths {
                    let strength = strength.trim();
                    if !strength.is_empty() && !next.strengths.iter().any(|s| s == strength) {
                        next.strengths.push(strength.to_string());
                    }
                }
            }
            CoachingAction::RecordExchange => {
                next.exchanges.exchange_count += 1;
                next.exchanges.exchanges_since_summary += 1;
            }
            CoachingAction::ResetSummaryCounter => {
                next.exchanges.exchanges_since_summary = 0;
            }
        }
        next.last_updated_at = now.max(self.last_updated_at);
        next
    }
}

fn first_phase(module: WorkshopModule) -> GrowPhase {
    module
        .legal_grow_phases()
        .first()
        .copied()
        .unwrap_or(GrowPhase::Goal)
}
