//! Declarative phase-requirement tables.
//!
//! Each module lists its phases; each phase lists the dot-notation paths that
//! must be filled in the module's partial record. Conditional extensions add
//! paths when another field holds a given value, and blocking rules mark
//! regulatory values whose absence halts the workshop entirely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::modules::WorkshopModule;
use crate::error::RequirementsError;

pub const PERSONAL_STATUS_PATH: &str = "personal.currentStatus";
pub const BENEFIT_DAYS_PATH: &str = "personal.benefitDaysRemaining";

/// Extra required paths that apply when `field` equals `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRequirement {
    pub field: String,
    pub equals: Value,
    pub then_required: Vec<String>,
}

impl ConditionalRequirement {
    pub fn is_active(&self, record: &Value) -> bool {
        super::completion::resolve_path(record, &self.field).is_some_and(|v| v == &self.equals)
    }
}

/// A hard blocker: when `when_field` equals `equals`, `required_field` must
/// hold a value (a number, if `numeric`) before anything else may proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingRule {
    pub when_field: String,
    pub equals: Value,
    pub required_field: String,
    #[serde(default)]
    pub numeric: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRequirement {
    pub phase: String,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub conditionals: Vec<ConditionalRequirement>,
    #[serde(default)]
    pub blockers: Vec<BlockingRule>,
}

impl PhaseRequirement {
    pub fn new(phase: &str, required: &[&str]) -> Self {
        Self {
            phase: phase.to_string(),
            required: required.iter().map(|p| p.to_string()).collect(),
            conditionals: Vec::new(),
            blockers: Vec::new(),
        }
    }

    pub fn with_conditional(mut self, field: &str, equals: Value, then_required: &[&str]) -> Self {
        self.conditionals.push(ConditionalRequirement {
            field: field.to_string(),
            equals,
            then_required: then_required.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    pub fn with_blocker(mut self, rule: BlockingRule) -> Self {
        self.blockers.push(rule);
        self
    }

    /// Base paths plus those of every active conditional, without duplicates.
    pub fn active_required(&self, record: &Value) -> Vec<String> {
        let mut paths = self.required.clone();
        for conditional in self.conditionals.iter().filter(|c| c.is_active(record)) {
            for path in &conditional.then_required {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
        }
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRequirements {
    pub module: WorkshopModule,
    pub phases: Vec<PhaseRequirement>,
}

impl ModuleRequirements {
    pub fn phase(&self, phase: &str) -> Option<&PhaseRequirement> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Requirement table for the whole workshop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementTable {
    pub version: String,
    pub modules: Vec<ModuleRequirements>,
}

impl RequirementTable {
    /// Load a table from JSON and check it for empty paths and duplicate
    /// phases.
    pub fn from_json(json: &str) -> Result<Self, RequirementsError> {
        let table: Self = serde_json::from_str(json)?;
        table.check()?;
        Ok(table)
    }

    fn check(&self) -> Result<(), RequirementsError> {
        for module in &self.modules {
            let mut seen: Vec<&str> = Vec::new();
            for phase in &module.phases {
                if seen.contains(&phase.phase.as_str()) {
                    return Err(RequirementsError::DuplicatePhase {
                        module: module.module.to_string(),
                        phase: phase.phase.clone(),
                    });
                }
                seen.push(&phase.phase);

                let conditional_paths = phase
                    .conditionals
                    .iter()
                    .flat_map(|c| std::iter::once(&c.field).chain(&c.then_required));
                let blocker_paths = phase
                    .blockers
                    .iter()
                    .flat_map(|b| [&b.when_field, &b.required_field]);
                let empty = phase
                    .required
                    .iter()
                    .chain(conditional_paths)
                    .chain(blocker_paths)
                    .any(|p| p.trim().is_empty());
                if empty {
                    return Err(RequirementsError::EmptyPath {
                        module: module.module.to_string(),
                        phase: phase.phase.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn module(&self, module: WorkshopModule) -> Option<&ModuleRequirements> {
        self.modules.iter().find(|m| m.module == module)
    }

    /// The built-in business-plan table.
    pub fn business_plan() -> Self {
        use WorkshopModule::*;

        let unemployed = Value::from("unemployed");
        let modules = vec![
            ModuleRequirements {
                module: Intake,
                phases: vec![
                    PhaseRequirement::new("personal", &["personal.name", PERSONAL_STATUS_PATH])
                        .with_conditional(PERSONAL_STATUS_PATH, unemployed.clone(), &[BENEFIT_DAYS_PATH])
                        .with_blocker(BlockingRule {
                            when_field: PERSONAL_STATUS_PATH.to_string(),
                            equals: unemployed,
                            required_field: BENEFIT_DAYS_PATH.to_string(),
                            numeric: true,
                            reason: "Für den Gründungszuschuss wird die exakte Anzahl der \
                                     verbleibenden ALG-I-Tage benötigt (mindestens 150)."
                                .to_string(),
                        }),
                    PhaseRequirement::new(
                        "experience",
                        &[
                            "experience.profession",
                            "experience.yearsOfExperience",
                            "experience.qualifications",
                        ],
                    ),
                    PhaseRequirement::new("motivation", &["motivation.reason", "motivation.goals"]),
                ],
            },
            ModuleRequirements {
                module: BusinessModel,
                phases: vec![
                    PhaseRequirement::new(
                        "offering",
                        &[
                            "offering.description",
                            "offering.customerProblem",
                            "offering.valueProposition",
                        ],
                    ),
                    PhaseRequirement::new("revenue", &["revenue.model", "revenue.pricing"]),
                ],
            },
            ModuleRequirements {
                module: Company,
                phases: vec![
                    PhaseRequirement::new("legal", &["legal.form", "legal.name", "legal.location"])
                        .with_conditional("legal.form", Value::from("gmbh"), &["legal.shareCapital"]),
                    PhaseRequirement::new("team", &["team.founders"]).with_conditional(
                        "team.hasEmployees",
                        Value::Bool(true),
                        &["team.plannedEmployees"],
                    ),
                ],
            },
            ModuleRequirements {
                module: Market,
                phases: vec![
                    PhaseRequirement::new("target", &["targetMarket.segments", "targetMarket.size"]),
                    PhaseRequirement::new(
                        "competition",
                        &["competition.competitors", "competition.differentiation"],
                    ),
                ],
            },
            ModuleRequirements {
                module: Marketing,
                phases: vec![
                    PhaseRequirement::new("channels", &["channels.primary", "channels.budget"]),
                    PhaseRequirement::new("sales", &["sales.process", "sales.pricingStrategy"]),
                ],
            },
            ModuleRequirements {
                module: Finance,
                phases: vec![
                    PhaseRequirement::new("capital", &["capital.requirement", "capital.ownFunds"])
                        .with_conditional(
                            "capital.needsFinancing",
                            Value::Bool(true),
                            &["capital.financingSource"],
                        ),
                    PhaseRequirement::new(
                        "revenue_plan",
                        &["revenuePlan.year1", "revenuePlan.year2", "revenuePlan.year3"],
                    ),
                    PhaseRequirement::new("costs", &["costs.fixedMonthly", "costs.privateWithdrawal"]),
                ],
            },
            ModuleRequirements {
                module: Strategy,
                phases: vec![PhaseRequirement::new(
                    "swot",
                    &[
                        "swot.strengths",
                        "swot.weaknesses",
                        "swot.opportunities",
                        "swot.threats",
                    ],
                )],
            },
            ModuleRequirements {
                module: Milestones,
                phases: vec![PhaseRequirement::new(
                    "plan",
                    &["milestones.items", "milestones.launchDate"],
                )],
            },
            ModuleRequirements {
                module: Kpi,
                phases: vec![PhaseRequirement::new("kpis", &["kpis.items", "kpis.breakEvenMonth"])],
            },
            ModuleRequirements {
                module: Summary,
                phases: vec![PhaseRequirement::new("summary", &["summary.executiveSummary"])],
            },
        ];

        Self {
            version: "business-plan-2024.2".to_string(),
            modules,
        }
    }
}

impl Default for RequirementTable {
    fn default() -> Self {
        Self::business_plan()
    }
}
