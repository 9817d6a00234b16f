//! Phase and module completion checks.
//!
//! A field counts as absent when it is missing, `null`, an empty (or
//! whitespace-only) string, or an empty array/object. Path resolution
//! tolerates missing intermediate objects.
//!
//! Blocking is stronger than incompleteness: a blocked phase halts every
//! later phase of the module, and the gate reports it before anything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::eligibility::benefit_days;
use super::modules::WorkshopModule;
use super::requirements::{BlockingRule, ModuleRequirements, PhaseRequirement, RequirementTable};
use crate::conversation::Addressing;
use crate::error::ValidationError;

/// Resolve a dot-notation path (`"a.b.0.c"`) inside a record.
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(record, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Whether a resolved value counts as filled in.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Standard completion of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCompletion {
    pub phase: String,
    pub is_complete: bool,
    pub missing_fields: Vec<String>,
    pub completed_fields: Vec<String>,
}

/// Completion of one phase including its regulatory blockers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingPhaseCompletion {
    #[serde(flatten)]
    pub completion: PhaseCompletion,
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_field: Option<String>,
    /// The blocking field needs a whole number, not just any value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked_numeric: bool,
}

/// Check the required (and active conditional) fields of a phase.
pub fn validate_phase(requirement: &PhaseRequirement, record: &Value) -> PhaseCompletion {
    let (completed_fields, missing_fields): (Vec<String>, Vec<String>) = requirement
        .active_required(record)
        .into_iter()
        .partition(|path| is_present(resolve_path(record, path)));
    PhaseCompletion {
        phase: requirement.phase.clone(),
        is_complete: missing_fields.is_empty(),
        missing_fields,
        completed_fields,
    }
}

fn first_violated_blocker<'a>(
    requirement: &'a PhaseRequirement,
    record: &Value,
) -> Option<&'a BlockingRule> {
    requirement.blockers.iter().find(|rule| {
        let applies = resolve_path(record, &rule.when_field).is_some_and(|v| v == &rule.equals);
        if !applies {
            return false;
        }
        let value = resolve_path(record, &rule.required_field);
        if rule.numeric {
            value.and_then(benefit_days).is_none()
        } else {
            !is_present(value)
        }
    })
}

/// Phase completion plus blocker evaluation. A blocked phase is never
/// complete, whatever else the record holds.
pub fn validate_phase_blocking(
    requirement: &PhaseRequirement,
    record: &Value,
) -> BlockingPhaseCompletion {
    let mut completion = validate_phase(requirement, record);
    match first_violated_blocker(requirement, record) {
        Some(rule) => {
            completion.is_complete = false;
            if !completion.missing_fields.contains(&rule.required_field) {
                completion.missing_fields.insert(0, rule.required_field.clone());
                completion.completed_fields.retain(|f| f != &rule.required_field);
            }
            BlockingPhaseCompletion {
                completion,
                is_blocked: true,
                block_reason: Some(rule.reason.clone()),
                blocked_field: Some(rule.required_field.clone()),
                blocked_numeric: rule.numeric,
            }
        }
        None => BlockingPhaseCompletion {
            completion,
            is_blocked: false,
            block_reason: None,
            blocked_field: None,
            blocked_numeric: false,
        },
    }
}

/// Completion of a whole module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCompletion {
    pub module: WorkshopModule,
    pub is_complete: bool,
    pub is_blocked: bool,
    pub phases: Vec<BlockingPhaseCompletion>,
    pub progress_percent: u8,
}

impl ModuleCompletion {
    /// The first phase that is blocked or incomplete.
    pub fn current_phase(&self) -> Option<&BlockingPhaseCompletion> {
        self.phases.iter().find(|p| !p.completion.is_complete)
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Evaluate every phase of a module against its record.
pub fn validate_module(requirements: &ModuleRequirements, record: &Value) -> ModuleCompletion {
    let phases: Vec<BlockingPhaseCompletion> = requirements
        .phases
        .iter()
        .map(|phase| validate_phase_blocking(phase, record))
        .collect();
    let (completed, total) = field_totals(&phases);
    ModuleCompletion {
        module: requirements.module,
        is_complete: phases.iter().all(|p| p.completion.is_complete),
        is_blocked: phases.iter().any(|p| p.is_blocked),
        progress_percent: percent(completed, total),
        phases,
    }
}

fn field_totals(phases: &[BlockingPhaseCompletion]) -> (usize, usize) {
    phases.iter().fold((0, 0), |(done, total), p| {
        let c = &p.completion;
        (
            done + c.completed_fields.len(),
            total + c.completed_fields.len() + c.missing_fields.len(),
        )
    })
}

/// Completed required fields over all required fields of a module, rounded.
pub fn progress_percentage(requirements: &ModuleRequirements, record: &Value) -> u8 {
    validate_module(requirements, record).progress_percent
}

/// Progress across the whole workshop. Modules without a record count with
/// all their base fields missing.
pub fn overall_progress<'a>(
    table: &RequirementTable,
    record_for: impl Fn(WorkshopModule) -> Option<&'a Value>,
) -> u8 {
    let empty = Value::Null;
    let (completed, total) = table.modules.iter().fold((0, 0), |(done, total), reqs| {
        let record = record_for(reqs.module).unwrap_or(&empty);
        let (d, t) = field_totals(&validate_module(reqs, record).phases);
        (done + d, total + t)
    });
    percent(completed, total)
}

/// Gate for leaving `phase` of `module`.
///
/// A blocker in this phase or any earlier phase of the module wins over
/// everything else; otherwise missing fields of `phase` itself are reported.
pub fn check_phase_progression(
    table: &RequirementTable,
    module: WorkshopModule,
    phase: &str,
    record: &Value,
) -> Result<(), ValidationError> {
    let Some(requirements) = table.module(module) else {
        return Ok(());
    };
    for requirement in &requirements.phases {
        let result = validate_phase_blocking(requirement, record);
        if result.is_blocked {
            info!(module = %module, phase = %requirement.phase, "Progression blocked");
            return Err(ValidationError::Blocked {
                module: module.to_string(),
                phase: requirement.phase.clone(),
                field: result.blocked_field.unwrap_or_default(),
                reason: result.block_reason.unwrap_or_default(),
                numeric: result.blocked_numeric,
            });
        }
        if requirement.phase == phase {
            if !result.completion.is_complete {
                return Err(ValidationError::Incomplete {
                    module: module.to_string(),
                    phase: requirement.phase.clone(),
                    missing: result.completion.missing_fields,
                });
            }
            return Ok(());
        }
    }
    Ok(())
}

/// Gate for leaving `module`: every phase must be complete and none blocked.
pub fn check_module_progression(
    table: &RequirementTable,
    module: WorkshopModule,
    record: &Value,
) -> Result<(), ValidationError> {
    let Some(requirements) = table.module(module) else {
        return Ok(());
    };
    for requirement in &requirements.phases {
        check_phase_progression(table, module, &requirement.phase, record)?;
    }
    Ok(())
}

/// Prompt that asks for exactly the blocking value before anything else.
pub fn blocker_prompt(error: &ValidationError, addressing: Addressing) -> Option<String> {
    let ValidationError::Blocked {
        field,
        reason,
        numeric,
        ..
    } = error
    else {
        return None;
    };
    let until = if *numeric {
        "bis ein exakter Zahlenwert vorliegt"
    } else {
        "bis dieser Wert vorliegt"
    };
    let ask = match addressing {
        Addressing::Informal => format!(
            "Bitte frage jetzt ausschließlich nach diesem Wert (Feld `{field}`) \
             und stelle keine andere Frage, {until}."
        ),
        Addressing::Formal => format!(
            "Bitte fragen Sie jetzt ausschließlich nach diesem Wert (Feld `{field}`) \
             und stellen Sie keine andere Frage, {until}."
        ),
    };
    Some(format!("BLOCKIERT: {reason} {ask}"))
}
