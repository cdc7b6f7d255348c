//! Tactical Situation Analyzer
//!
//! Derives threat, control, flanking and formation information from a
//! snapshot. Nothing here mutates game state.

pub mod analyzer;
pub mod damage;
pub mod formation;
pub mod situation;
pub mod threat;

pub use analyzer::{momentum, TacticalAnalyzer};
pub use damage::DamageModel;
pub use formation::classify_formation;
pub use situation::{
    ControlMap, ControlZone, FlankingOpportunity, Formation, TacticalSituation, ThreatMap,
};
pub use threat::{estimate_unit_threat, threat_weight};
