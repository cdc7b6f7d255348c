//! Strategy Evaluator
//!
//! Architecture: Trait + Data hybrid
//! - `StrategyEvaluator` trait defines the scoring interface
//! - `ArchetypeProfile` holds TOML-loaded traits and weights
//! - `PatternMemory` drives counter-strategy re-weighting for adaptive play

pub mod adaptive;
pub mod archetype;
pub mod candidates;
pub mod evaluator;

pub use adaptive::{adapt, adaptation_rate, counter_strategy, OpponentPattern, PatternMemory};
pub use archetype::{
    load_archetype, load_archetype_from, Archetype, ArchetypeProfile, ScoringWeights, TargetPriority,
    TraitDelta, TraitRecord, MAX_TRAIT_SHIFT,
};
pub use candidates::generate_candidates;
pub use evaluator::{
    ArchetypeEvaluator, Choice, ScoredCandidate, SituationSignals, SituationSummary, StrategyEvaluator,
};
