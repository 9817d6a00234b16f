//! Error types for the coaching engine.
//!
//! Classification ties and merge conflicts are never errors; they resolve to
//! documented defaults. Only the progression gate, configuration, requirement
//! tables, and snapshot persistence report failures.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Requirements error: {0}")]
    Requirements(#[from] RequirementsError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Progression gate outcomes that stop a workshop phase from advancing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Required fields are missing. Recoverable: the conversation continues
    /// and asks for them.
    #[error("Phase {phase} of module {module} is incomplete, missing: {}", missing.join(", "))]
    Incomplete {
        module: String,
        phase: String,
        missing: Vec<String>,
    },

    /// A regulatory-grade value is missing. Halts all progression until the
    /// exact value has been supplied.
    #[error("Phase {phase} of module {module} is blocked on {field}: {reason}")]
    Blocked {
        module: String,
        phase: String,
        field: String,
        reason: String,
        /// The value must be a whole number.
        numeric: bool,
    },
}

impl ValidationError {
    /// Whether this is the hard, regulatory blocker.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Errors raised while loading requirement tables.
#[derive(Debug, thiserror::Error)]
pub enum RequirementsError {
    #[error("Failed to parse requirement table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Empty field path in phase {phase} of module {module}")]
    EmptyPath { module: String, phase: String },

    #[error("Duplicate phase {phase} in module {module}")]
    DuplicatePhase { module: String, phase: String },
}

/// Snapshot persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
