//! Coaching engine: classification, quality control, session state.
//!
//! Every turn flows through:
//! 1. `detect_stage_with()` / `detect_grow_phase()`: read-only classification
//! 2. `analyze_message()`: metric deltas for the newest message
//! 3. `CoachingState::apply()`: the only way state changes
//! 4. `validate_quality()`: prioritized corrections for the next assistant turn
//!
//! `CoachingSession` wires these together and hands snapshots to a sink.

pub mod grow;
pub mod metrics;
pub mod quality;
pub mod session;
pub mod signals;
pub mod stage;
pub mod state;

pub use grow::{GrowCompleteness, GrowPhase, detect_grow_phase, next_grow_phase};
pub use metrics::{CoachingMetrics, MetricCounts, MetricDelta, MetricKind, analyze_message};
pub use quality::{Correction, CorrectionPriority, QualityReport, QualityThresholds};
pub use session::{CoachingSession, ModuleAdvance, TurnOutcome};
pub use signals::{Emotion, LimitingBelief};
pub use stage::{CoachingDepth, Stage, StageDetection, StageWeighting, detect_stage};
pub use state::{CoachingAction, CoachingState};
