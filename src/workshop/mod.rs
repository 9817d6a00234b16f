//! Workshop structure: the ten modules, their requirement tables, and the
//! partial records extracted turn by turn.

pub mod completion;
pub mod eligibility;
pub mod merge;
pub mod modules;
pub mod requirements;

pub use completion::{ModuleCompletion, PhaseCompletion, check_phase_progression, validate_module};
pub use eligibility::{GrantEligibility, MIN_BENEFIT_DAYS, check_grant_eligibility};
pub use merge::{MergePolicy, MergeStrategy, ProvenanceMode, merge_records};
pub use modules::WorkshopModule;
pub use requirements::RequirementTable;
