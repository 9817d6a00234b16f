//! CoachingSession: runs the per-turn pipeline for one workshop.
//!
//! Each turn: classify stage and GROW phase from the full history, analyze
//! the newest message into metric deltas, apply them (plus emotion, belief
//! and exchange bookkeeping) through the state reducer, validate quality,
//! and hand the new snapshot to the sink. Extracted module data goes through
//! `merge_extraction`, and `advance_module` is gated by completion.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::grow::{GrowPhase, detect_grow_phase, transition_message};
use super::metrics::{CoachingMetrics, MetricKind, analyze_message};
use super::quality::{QualityContext, QualityReport, validate_quality};
use super::signals::{Emotion, LimitingBelief, detect_beliefs, detect_emotion};
use super::stage::{StageDetection, detect_stage_with};
use super::state::{CoachingAction, CoachingState};
use crate::config::EngineConfig;
use crate::conversation::{Message, Role};
use crate::error::{self, ValidationError};
use crate::persistence::SnapshotSink;
use crate::workshop::completion::{
    ModuleCompletion, blocker_prompt, check_module_progression, overall_progress, resolve_path,
    validate_module,
};
use crate::workshop::eligibility::{GrantEligibility, eligibility_from_record};
use crate::workshop::merge::{MergePolicy, merge_records};
use crate::workshop::modules::WorkshopModule;
use crate::workshop::requirements::RequirementTable;

const STRENGTHS_PATH: &str = "strengths.raw";

/// What the transport layer gets back after each turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub stage: StageDetection,
    pub grow_phase: GrowPhase,
    pub metrics: CoachingMetrics,
    pub quality: QualityReport,
    /// Highest-priority correction for the next assistant turn. `None` while
    /// the module is blocked.
    pub correction_prompt: Option<String>,
    /// All high and medium corrections joined. `None` while the module is
    /// blocked.
    pub combined_prompt: Option<String>,
    /// Set while the current module is blocked. It is then the only prompt
    /// in the outcome.
    pub blocker_prompt: Option<String>,
    /// Bridging text when the GROW phase moved this turn. Never set while
    /// the module is blocked.
    pub transition: Option<String>,
    pub emotion: Option<Emotion>,
    pub beliefs: Vec<LimitingBelief>,
}

/// Result of a successful module advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAdvance {
    pub from: WorkshopModule,
    pub to: WorkshopModule,
    pub message: String,
}

/// One founder's workshop: coaching state plus the partial module records.
pub struct CoachingSession {
    session_id: Uuid,
    config: EngineConfig,
    state: CoachingState,
    records: BTreeMap<WorkshopModule, Value>,
    requirements: RequirementTable,
    merge_policy: MergePolicy,
    sink: Arc<dyn SnapshotSink>,
}

impl CoachingSession {
    pub fn new(config: EngineConfig, sink: Arc<dyn SnapshotSink>) -> Self {
        let merge_policy = MergePolicy::business_plan().with_provenance(config.provenance);
        Self {
            session_id: Uuid::new_v4(),
            config,
            state: CoachingState::new(),
            records: BTreeMap::new(),
            requirements: RequirementTable::business_plan(),
            merge_policy,
            sink,
        }
    }

    /// Continue a session from a stored snapshot.
    pub fn restore(
        session_id: Uuid,
        state: CoachingState,
        config: EngineConfig,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            session_id,
            state,
            ..Self::new(config, sink)
        }
    }

    pub fn with_requirements(mut self, requirements: RequirementTable) -> Self {
        self.requirements = requirements;
        self
    }

    /// Load the requirement table from JSON instead of the built-in one.
    pub fn with_requirements_json(self, json: &str) -> error::Result<Self> {
        let requirements = RequirementTable::from_json(json)?;
        Ok(self.with_requirements(requirements))
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Seed the module records, e.g. when restoring a stored session.
    pub fn with_records(
        mut self,
        records: impl IntoIterator<Item = (WorkshopModule, Value)>,
    ) -> Self {
        self.records = records.into_iter().collect();
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &CoachingState {
        &self.state
    }

    pub fn current_module(&self) -> WorkshopModule {
        self.state.current_module()
    }

    pub fn record(&self, module: WorkshopModule) -> Option<&Value> {
        self.records.get(&module)
    }

    pub fn records(&self) -> &BTreeMap<WorkshopModule, Value> {
        &self.records
    }

    /// Run one turn over the full, ordered history.
    ///
    /// While the current module is blocked the GROW phase is held and the
    /// blocker prompt replaces every other prompt.
    pub async fn process_turn(&mut self, messages: &[Message]) -> TurnOutcome {
        let module = self.state.current_module();
        let blocker_prompt = self.blocker_prompt();
        let stage = detect_stage_with(messages, &self.config.stage);
        let detected_phase = detect_grow_phase(messages, module);
        debug!(
            session_id = %self.session_id,
            module = %module,
            stage = %stage.stage,
            grow_phase = %detected_phase,
            blocked = blocker_prompt.is_some(),
            "Classified turn"
        );

        let mut state = self.state.clone();
        let mut emotion = None;
        let mut beliefs = Vec::new();

        if let Some(latest) = messages.last() {
            let deltas = analyze_message(&latest.text, latest.role);
            let has = |kind: MetricKind| deltas.iter().any(|d| d.kind == kind);
            let empathic = has(MetricKind::Empathy);
            let summarized = has(MetricKind::ReflectiveSummary);
            if !deltas.is_empty() {
                state = state.apply(CoachingAction::ApplyMetricDeltas(deltas));
            }

            match latest.role {
                Role::User => {
                    state = state.apply(CoachingAction::RecordExchange);
                    emotion = detect_emotion(&latest.text);
                    if let Some(emotion) = emotion {
                        state = state.apply(CoachingAction::RecordEmotion(emotion));
                    }
                    beliefs = detect_beliefs(&latest.text);
                    for belief in &beliefs {
                        state = state.apply(CoachingAction::AddBelief(*belief));
                    }
                }
                Role::Assistant => {
                    if empathic && state.has_unaddressed_emotion() {
                        state = state.apply(CoachingAction::AddressLastEmotion);
                    }
                    if summarized {
                        state = state.apply(CoachingAction::ResetSummaryCounter);
                    }
                }
            }
        }

        if stage.stage != state.current_stage() {
            info!(
                session_id = %self.session_id,
                from = %state.current_stage(),
                to = %stage.stage,
                "Stage changed"
            );
            let trigger = messages
                .iter()
                .rev()
                .find(|m| m.is_user())
                .map(|m| m.text.clone());
            state = state.apply(CoachingAction::SetStage {
                stage: stage.stage,
                trigger,
            });
        }

        let previous_phase = state.grow_phase_of(module);
        let transition = if detected_phase == previous_phase {
            None
        } else if blocker_prompt.is_some() {
            debug!(
                session_id = %self.session_id,
                module = %module,
                held = %previous_phase,
                detected = %detected_phase,
                "GROW phase held while module is blocked"
            );
            None
        } else {
            info!(
                session_id = %self.session_id,
                module = %module,
                from = %previous_phase,
                to = %detected_phase,
                "GROW phase changed"
            );
            state = state.apply(CoachingAction::SetGrowPhase {
                module,
                phase: detected_phase,
            });
            Some(transition_message(
                (module, previous_phase),
                (module, detected_phase),
                self.config.addressing,
            ))
        };
        let grow_phase = state.grow_phase_of(module);

        let exchanges = state.exchanges();
        let context = QualityContext {
            exchange_count: exchanges.exchange_count,
            emotion_detected: state.has_unaddressed_emotion(),
            exchanges_since_last_summary: exchanges.exchanges_since_summary,
        };
        let quality = validate_quality(state.metrics(), &context, &self.config.quality);
        debug!(
            session_id = %self.session_id,
            score = quality.score,
            corrections = quality.corrections.len(),
            "Validated quality"
        );

        self.state = state;
        self.persist().await;

        let (correction_prompt, combined_prompt) = match blocker_prompt {
            Some(_) => (None, None),
            None => (quality.top_prompt(), quality.combined_prompt()),
        };
        TurnOutcome {
            stage,
            grow_phase,
            metrics: self.state.metrics().clone(),
            correction_prompt,
            combined_prompt,
            blocker_prompt,
            quality,
            transition,
            emotion,
            beliefs,
        }
    }

    /// Merge freshly extracted data into a module's record and report its
    /// completion.
    pub async fn merge_extraction(
        &mut self,
        module: WorkshopModule,
        update: &Value,
    ) -> ModuleCompletion {
        let existing = self.records.get(&module).cloned().unwrap_or(Value::Null);
        let merged = merge_records(&existing, update, &self.merge_policy);

        if let Some(Value::Array(items)) = resolve_path(update, STRENGTHS_PATH) {
            let strengths: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if !strengths.is_empty() {
                self.state = self.state.apply(CoachingAction::AddStrengths(strengths));
            }
        }

        self.records.insert(module, merged);
        let completion = self.completion(module);
        info!(
            session_id = %self.session_id,
            module = %module,
            progress = completion.progress_percent,
            blocked = completion.is_blocked,
            "Merged extraction"
        );
        self.persist().await;
        completion
    }

    /// Completion of a module against its current record.
    pub fn completion(&self, module: WorkshopModule) -> ModuleCompletion {
        let record = self.records.get(&module).unwrap_or(&Value::Null);
        match self.requirements.module(module) {
            Some(reqs) => validate_module(reqs, record),
            None => ModuleCompletion {
                module,
                is_complete: true,
                is_blocked: false,
                phases: Vec::new(),
                progress_percent: 100,
            },
        }
    }

    /// Gate result for leaving the current module.
    pub fn check_progression(&self) -> Result<(), ValidationError> {
        let module = self.state.current_module();
        let record = self.records.get(&module).unwrap_or(&Value::Null);
        check_module_progression(&self.requirements, module, record)
    }

    fn blocker_prompt(&self) -> Option<String> {
        self.check_progression()
            .err()
            .and_then(|err| blocker_prompt(&err, self.config.addressing))
    }

    /// Move to the next module once the current one is complete.
    ///
    /// Returns `Ok(None)` when the workshop is already at its last module.
    pub async fn advance_module(&mut self) -> Result<Option<ModuleAdvance>, ValidationError> {
        let from = self.state.current_module();
        if let Err(err) = self.check_progression() {
            info!(session_id = %self.session_id, module = %from, "Module advance refused: {}", err);
            return Err(err);
        }
        let Some(to) = from.next() else {
            return Ok(None);
        };

        let from_phase = self.state.grow_phase_of(from);
        self.state = self.state.apply(CoachingAction::SetModule(to));
        let message = transition_message(
            (from, from_phase),
            (to, self.state.current_grow_phase()),
            self.config.addressing,
        );
        info!(session_id = %self.session_id, from = %from, to = %to, "Advanced module");
        self.persist().await;
        Ok(Some(ModuleAdvance { from, to, message }))
    }

    /// Grant eligibility from the intake record, once the day count is known.
    pub fn grant_eligibility(&self) -> Option<GrantEligibility> {
        self.records
            .get(&WorkshopModule::Intake)
            .and_then(eligibility_from_record)
    }

    /// Progress across the whole workshop, 0 to 100.
    pub fn overall_progress(&self) -> u8 {
        overall_progress(&self.requirements, |m| self.records.get(&m))
    }

    /// Discard all progress. Only ever triggered by an explicit user action.
    pub async fn reset(&mut self) {
        info!(session_id = %self.session_id, "Resetting coaching session");
        self.state = self.state.reset();
        self.records.clear();
        self.persist().await;
    }

    async fn persist(&self) {
        if let Err(e) = self.sink.save(self.session_id, &self.state).await {
            warn!(session_id = %self.session_id, "Failed to persist coaching state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::stage::Stage;
    use crate::error::{PersistenceError, RequirementsError};
    use crate::persistence::MemorySnapshotSink;
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingSink;

    #[async_trait]
    impl SnapshotSink for FailingSink {
        async fn save(&self, _: Uuid, _: &CoachingState) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("offline".into()))
        }
    }

    fn session() -> (CoachingSession, Arc<MemorySnapshotSink>) {
        let sink = Arc::new(MemorySnapshotSink::new());
        let session = CoachingSession::new(EngineConfig::default(), sink.clone());
        (session, sink)
    }

    #[tokio::test]
    async fn empty_history_resolves_to_defaults() {
        let (mut session, _) = session();
        let outcome = session.process_turn(&[]).await;
        assert_eq!(outcome.stage.stage, Stage::Contemplation);
        assert_eq!(outcome.grow_phase, GrowPhase::Goal);
        assert_eq!(outcome.metrics, CoachingMetrics::default());
        assert!(session.state().stage_history().is_empty());
        assert!(outcome.transition.is_none());
    }

    #[tokio::test]
    async fn user_turn_records_exchange_emotion_and_beliefs() {
        let (mut session, sink) = session();
        let history = vec![Message::user(
            "Ich bin total überfordert, und ehrlich gesagt bin ich nicht gut mit Zahlen.",
        )];
        let outcome = session.process_turn(&history).await;

        assert_eq!(outcome.emotion, Some(Emotion::Overwhelm));
        assert_eq!(outcome.beliefs, vec![LimitingBelief::NotGoodWithNumbers]);
        let state = session.state();
        assert_eq!(state.exchanges().exchange_count, 1);
        assert!(state.has_unaddressed_emotion());
        assert_eq!(state.beliefs().len(), 1);
        assert_eq!(sink.get(session.session_id()).await.unwrap(), *state);
    }

    #[tokio::test]
    async fn empathic_reply_addresses_emotion() {
        let (mut session, _) = session();
        let mut history = vec![Message::user("Ich habe große Angst vor dem Schritt.")];
        session.process_turn(&history).await;
        assert!(session.state().has_unaddressed_emotion());

        history.push(Message::assistant(
            "Ich verstehe, dass dich das beschäftigt. Was denkst du, was dir helfen würde?",
        ));
        let outcome = session.process_turn(&history).await;
        assert!(!session.state().has_unaddressed_emotion());
        assert_eq!(outcome.metrics.counts().open_questions, 1);
        assert_eq!(session.state().exchanges().exchange_count, 1);
    }

    #[tokio::test]
    async fn stage_history_only_grows_on_change() {
        let (mut session, _) = session();
        let history = vec![Message::user(
            "Ich habe schon angefangen und bereits erste Kunden gewonnen.",
        )];
        session.process_turn(&history).await;
        let after_first = session.state().stage_history().len();
        assert_eq!(after_first, 1);
        assert_eq!(session.state().current_stage(), Stage::Action);

        session.process_turn(&history).await;
        assert_eq!(session.state().stage_history().len(), after_first);
    }

    #[tokio::test]
    async fn persistence_failure_keeps_in_memory_state() {
        let mut session = CoachingSession::new(EngineConfig::default(), Arc::new(FailingSink));
        session
            .process_turn(&[Message::user("Ich möchte ein Café eröffnen.")])
            .await;
        assert_eq!(session.state().exchanges().exchange_count, 1);
    }

    #[tokio::test]
    async fn blocked_intake_refuses_advance_and_prompts_for_days() {
        let (mut session, _) = session();
        let completion = session
            .merge_extraction(
                WorkshopModule::Intake,
                &json!({"personal": {"name": "Anna", "currentStatus": "unemployed"}}),
            )
            .await;
        assert!(completion.is_blocked);
        assert!(!completion.is_complete);

        let err = session.advance_module().await.unwrap_err();
        assert!(err.is_blocked());
        assert_eq!(session.current_module(), WorkshopModule::Intake);

        let outcome = session
            .process_turn(&[Message::user("Ich war lange arbeitslos.")])
            .await;
        assert!(outcome.blocker_prompt.unwrap().contains("benefitDaysRemaining"));
    }

    #[tokio::test]
    async fn blocked_module_holds_grow_phase_and_other_prompts() {
        let (mut session, _) = session();
        session
            .merge_extraction(
                WorkshopModule::Intake,
                &json!({"personal": {"name": "Anna", "currentStatus": "unemployed"}}),
            )
            .await;

        let mut history = vec![Message::user(
            "Ich habe Angst, aber ich werde ab Montag den nächsten Schritt gehen.",
        )];
        let outcome = session.process_turn(&history).await;

        assert_eq!(outcome.emotion, Some(Emotion::Fear));
        assert_eq!(outcome.grow_phase, GrowPhase::Goal);
        assert_eq!(session.state().current_grow_phase(), GrowPhase::Goal);
        assert!(outcome.transition.is_none());
        assert!(outcome.correction_prompt.is_none());
        assert!(outcome.combined_prompt.is_none());
        assert!(!outcome.quality.corrections.is_empty());
        assert!(outcome.blocker_prompt.unwrap().contains("benefitDaysRemaining"));

        session
            .merge_extraction(
                WorkshopModule::Intake,
                &json!({"personal": {"benefitDaysRemaining": 200}}),
            )
            .await;
        history.push(Message::user("Ich werde ab Montag loslegen."));
        let outcome = session.process_turn(&history).await;
        assert!(outcome.blocker_prompt.is_none());
        assert_eq!(outcome.grow_phase, GrowPhase::Will);
        assert!(outcome.transition.unwrap().starts_with("Danke, das Ziel"));
    }

    #[tokio::test]
    async fn complete_intake_advances_to_business_model() {
        let (mut session, _) = session();
        session
            .merge_extraction(
                WorkshopModule::Intake,
                &json!({
                    "personal": {"name": "Anna", "currentStatus": "unemployed", "benefitDaysRemaining": 180},
                    "experience": {"profession": "Köchin", "yearsOfExperience": 15, "qualifications": ["Meisterin"]},
                    "motivation": {"reason": "Eigenes Restaurant", "goals": ["Selbstständigkeit"]}
                }),
            )
            .await;
        assert!(session.grant_eligibility().unwrap().eligible);

        let advance = session.advance_module().await.unwrap().unwrap();
        assert_eq!(advance.from, WorkshopModule::Intake);
        assert_eq!(advance.to, WorkshopModule::BusinessModel);
        assert!(advance.message.contains("Geschäftsmodell"));
        assert_eq!(session.current_module(), WorkshopModule::BusinessModel);
    }

    #[tokio::test]
    async fn strengths_accumulate_in_state_and_record() {
        let (mut session, _) = session();
        let update = json!({"strengths": {"raw": ["Geduld", "Kochen"]}});
        session.merge_extraction(WorkshopModule::Intake, &update).await;
        session
            .merge_extraction(
                WorkshopModule::Intake,
                &json!({"strengths": {"raw": ["Kochen", "Organisation"]}}),
            )
            .await;

        assert_eq!(session.state().strengths(), ["Geduld", "Kochen", "Organisation"]);
        assert_eq!(
            session.record(WorkshopModule::Intake).unwrap()["strengths"]["raw"],
            json!(["Geduld", "Kochen", "Organisation"])
        );
    }

    #[tokio::test]
    async fn restored_session_continues_from_snapshot() {
        let (mut original, sink) = session();
        original
            .process_turn(&[Message::user("Ich habe schon angefangen.")])
            .await;
        let id = original.session_id();
        let snapshot = sink.get(id).await.unwrap();

        let mut restored =
            CoachingSession::restore(id, snapshot, EngineConfig::default(), sink.clone());
        assert_eq!(restored.session_id(), id);
        assert_eq!(restored.state().current_stage(), Stage::Action);
        restored
            .process_turn(&[Message::user("Ich habe schon angefangen."), Message::user("Weiter.")])
            .await;
        assert_eq!(restored.state().exchanges().exchange_count, 2);
    }

    #[tokio::test]
    async fn restored_session_keeps_seeded_records() {
        let (mut original, sink) = session();
        original
            .merge_extraction(WorkshopModule::Kpi, &json!({"kpis": {"breakEvenMonth": 12}}))
            .await;
        let progress = original.overall_progress();
        assert!(progress > 0);
        let id = original.session_id();
        let snapshot = sink.get(id).await.unwrap();

        let restored = CoachingSession::restore(id, snapshot, EngineConfig::default(), sink.clone())
            .with_records(original.records().clone());
        assert_eq!(restored.overall_progress(), progress);
        assert_eq!(
            restored.record(WorkshopModule::Kpi),
            original.record(WorkshopModule::Kpi)
        );
    }

    #[tokio::test]
    async fn requirements_json_errors_surface_as_engine_errors() {
        let (invalid, _) = session();
        let err = invalid
            .with_requirements_json(r#"{"version": "x", "modules": [{"module": "kpi", "phases": [
                {"phase": "a", "required": ["kpis.items"]},
                {"phase": "a", "required": ["kpis.breakEvenMonth"]}
            ]}]}"#)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            crate::error::Error::Requirements(RequirementsError::DuplicatePhase { .. })
        ));

        let (mini, _) = session();
        let mini = mini
            .with_requirements_json(
                r#"{"version": "mini", "modules": [
                    {"module": "intake", "phases": [{"phase": "basics", "required": ["personal.name"]}]}
                ]}"#,
            )
            .unwrap();
        assert!(mini.completion(WorkshopModule::Finance).is_complete);
    }

    #[tokio::test]
    async fn custom_requirements_and_policy_apply() {
        let table = RequirementTable::from_json(
            r#"{"version": "mini", "modules": [
                {"module": "intake", "phases": [{"phase": "basics", "required": ["personal.name"]}]}
            ]}"#,
        )
        .unwrap();
        let (session, _) = session();
        let mut session = session
            .with_requirements(table)
            .with_merge_policy(MergePolicy::replace_only());

        session
            .merge_extraction(WorkshopModule::Intake, &json!({"strengths": {"raw": ["a"]}}))
            .await;
        let completion = session
            .merge_extraction(
                WorkshopModule::Intake,
                &json!({"personal": {"name": "Ben"}, "strengths": {"raw": ["b"]}}),
            )
            .await;
        assert!(completion.is_complete);
        assert_eq!(
            session.record(WorkshopModule::Intake).unwrap()["strengths"]["raw"],
            json!(["b"])
        );
        assert!(session.completion(WorkshopModule::Finance).is_complete);
        assert!(session.advance_module().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reset_discards_progress() {
        let (mut session, _) = session();
        session
            .process_turn(&[Message::user("Ich habe schon angefangen.")])
            .await;
        session
            .merge_extraction(WorkshopModule::Kpi, &json!({"kpis": {"breakEvenMonth": 12}}))
            .await;
        assert!(session.overall_progress() > 0);

        session.reset().await;
        assert_eq!(session.state().exchanges().exchange_count, 0);
        assert!(session.state().stage_history().is_empty());
        assert!(session.record(WorkshopModule::Kpi).is_none());
        assert_eq!(session.overall_progress(), 0);
    }
}
