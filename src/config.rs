//! Engine configuration.
//!
//! Everything has a working default. `from_env` overrides individual values
//! from `PLAN_COACH_*` variables and silently keeps the default for anything
//! unparseable; `try_from_env` reports those values instead.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coaching::quality::QualityThresholds;
use crate::coaching::stage::StageWeighting;
use crate::conversation::Addressing;
use crate::error::ConfigError;
use crate::workshop::merge::ProvenanceMode;

const PREFIX: &str = "PLAN_COACH_";

/// Configuration of one coaching session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub quality: QualityThresholds,
    pub stage: StageWeighting,
    pub provenance: ProvenanceMode,
    pub addressing: Addressing,
}

impl EngineConfig {
    /// Defaults overridden by whatever parses from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`], but an unparseable value is an error.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::try_from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.read(&lookup, &mut |key: &str, err: String| {
            tracing::warn!(key = %key, "Ignoring invalid config value: {}", err);
        });
        config
    }

    pub fn try_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut first_error = None;
        config.read(&lookup, &mut |key: &str, message: String| {
            if first_error.is_none() {
                first_error = Some(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message,
                });
            }
        });
        match first_error {
            Some(err) => Err(err),
            None => Ok(config),
        }
    }

    fn read(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
        on_error: &mut dyn FnMut(&str, String),
    ) {
        let q = &mut self.quality;
        set(lookup, "ACCEPTANCE_THRESHOLD", &mut q.acceptance_score, on_error);
        set(lookup, "AUTONOMY_MIN", &mut q.autonomy_min, on_error);
        set(lookup, "AUTONOMY_GRACE", &mut q.autonomy_grace_exchanges, on_error);
        set(lookup, "ADVICE_MAX", &mut q.advice_max, on_error);
        set(lookup, "SUMMARY_INTERVAL", &mut q.summary_interval, on_error);
        set(lookup, "OPEN_QUESTION_TARGET", &mut q.open_question_target, on_error);
        set(lookup, "RECENT_WINDOW", &mut self.stage.recent_window, on_error);
        set(lookup, "RECENT_WEIGHT", &mut self.stage.recent_weight, on_error);
        set(lookup, "PROVENANCE", &mut self.provenance, on_error);
        set(lookup, "ADDRESSING", &mut self.addressing, on_error);

        if q.acceptance_score > 100 {
            on_error(&format!("{PREFIX}ACCEPTANCE_THRESHOLD"), "must be at most 100".into());
            q.acceptance_score = QualityThresholds::default().acceptance_score;
        }
        if !(0.0..=1.0).contains(&q.open_question_target) {
            on_error(&format!("{PREFIX}OPEN_QUESTION_TARGET"), "must be within 0..=1".into());
            q.open_question_target = QualityThresholds::default().open_question_target;
        }
    }
}

fn set<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
    on_error: &mut dyn FnMut(&str, String),
) where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{PREFIX}{name}");
    let Some(raw) = lookup(&key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(e) => on_error(&key, e.to_string()),
    }
}
