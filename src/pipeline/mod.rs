//! Decision Cache & Parallel Pipeline
//!
//! Serves per-unit decisions from a fingerprint cache or a precomputed table
//! when possible, and otherwise runs them on a bounded worker pool with
//! per-priority deadlines and a guaranteed fallback.

pub mod cache;
pub mod fingerprint;
pub mod metrics;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod precompute;
pub mod priority;

pub use cache::DecisionCache;
pub use fingerprint::{ContextFingerprint, DecisionRecord};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{
    ActionSource, BatchOutcome, DecisionOutcome, DecisionPipeline, DecisionSource, FallbackReason,
    UnitContext,
};
pub use precompute::{predict_followups, PrecomputedTable, PredictionJob, PredictionQueue};
pub use priority::PriorityTier;
