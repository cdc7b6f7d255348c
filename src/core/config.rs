//! Engine configuration with documented constants
//!
//! All tunable numbers are collected here. Every section deserializes with
//! defaults, so a TOML file only needs to name the values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::SkillLevel;
use crate::core::error::{EngineError, Result};
use crate::pipeline::PriorityTier;
use crate::strategy::Archetype;

/// Tactical Situation Analyzer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Cells within this distance of an enemy receive the awareness weight
    pub awareness_radius: u32,
    /// Influence decays linearly to zero beyond this many cells
    pub influence_radius: u32,
    /// Threat weight when a cell is inside an enemy's current attack range
    pub weight_in_range: f32,
    /// Threat weight when a cell is reachable next turn (move + attack range)
    pub weight_reachable: f32,
    /// Threat weight inside the awareness radius
    pub weight_aware: f32,
    /// Flanking cells above this threat value receive the exposure penalty
    pub threat_ceiling: f32,
    /// Absolute influence difference under which a cell counts as contested
    pub contest_margin: f32,
    /// Both influences below this value make a cell neutral
    pub neutral_floor: f32,
    /// Perpendicular deviation (cells) tolerated for a defensive line
    pub line_tolerance: f32,
    /// Minimum grid cell count before threat and control maps use rayon
    ///
    /// Below this, thread overhead exceeds the benefit.
    pub parallel_threshold: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            awareness_radius: 5,
            influence_radius: 3,
            weight_in_range: 1.0,
            weight_reachable: 0.7,
            weight_aware: 0.3,
            threat_ceiling: 20.0,
            contest_margin: 0.15,
            neutral_floor: 0.05,
            line_tolerance: 1.0,
            parallel_threshold: 4096,
        }
    }
}

/// Damage model constants
///
/// Shape is `dmg * armor_scale / (armor_scale + def) + dmg * guaranteed_fraction`.
/// These are balance knobs, not invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageConfig {
    pub armor_scale: f32,
    pub guaranteed_fraction: f32,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            armor_scale: 100.0,
            guaranteed_fraction: 0.1,
        }
    }
}

/// Per-tier decision deadlines in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTimeouts {
    pub critical_ms: u64,
    pub high_ms: u64,
    pub normal_ms: u64,
    pub low_ms: u64,
}

impl Default for TierTimeouts {
    fn default() -> Self {
        Self {
            critical_ms: 50,
            high_ms: 100,
            normal_ms: 200,
            low_ms: 500,
        }
    }
}

impl TierTimeouts {
    pub fn for_tier(&self, tier: PriorityTier) -> Duration {
        let ms = match tier {
            PriorityTier::Critical => self.critical_ms,
            PriorityTier::High => self.high_ms,
            PriorityTier::Normal => self.normal_ms,
            PriorityTier::Low => self.low_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Decision Cache & Parallel Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Size of the bounded worker pool
    pub workers: usize,
    /// Maximum cached decisions before the oldest is evicted
    pub cache_capacity: usize,
    /// Lifetime of a cached decision
    pub cache_ttl_ms: u64,
    /// Maximum entries in the precomputed-decisions table
    pub precompute_capacity: usize,
    /// Maximum pending background predictions; extra jobs are dropped
    pub prediction_queue_capacity: usize,
    /// Upper bound on follow-up contexts predicted after one live decision
    pub max_predictions_per_decision: usize,
    /// Confidence attached to the fallback action
    pub fallback_confidence: f32,
    pub tier_timeouts: TierTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            cache_capacity: 1000,
            cache_ttl_ms: 5_000,
            precompute_capacity: 256,
            prediction_queue_capacity: 64,
            max_predictions_per_decision: 3,
            fallback_confidence: 0.3,
            tier_timeouts: TierTimeouts::default(),
        }
    }
}

impl PipelineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Orchestration Coordinator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Total wall-clock budget of one coordination pass
    pub turn_budget_ms: u64,
    /// Fraction of the budget reserved for the Analyze phase
    pub analyze_share: f32,
    /// Fraction of the budget reserved for the Plan phase
    pub plan_share: f32,
    /// Fraction of the budget reserved for the Delegate phase
    pub delegate_share: f32,
    /// Priority tier used for per-unit delegations
    pub delegate_priority: PriorityTier,
    /// Archetype given to controllers created on demand
    pub default_archetype: Archetype,
    /// Skill level given to controllers created on demand
    pub default_skill: SkillLevel,
    /// Rejected writes tolerated per unit per turn before forcing DONE
    pub max_write_failures: u32,
    /// Whether to request natural-language rationale after each turn
    pub narrate: bool,
    /// Upper bound on a single rationale request
    pub narration_timeout_ms: u64,
    /// Seed for controllers that explore (learning skill level)
    pub seed: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            turn_budget_ms: 100,
            analyze_share: 0.25,
            plan_share: 0.05,
            delegate_share: 0.6,
            delegate_priority: PriorityTier::High,
            default_archetype: Archetype::Tactical,
            default_skill: SkillLevel::Strategic,
            max_write_failures: 3,
            narrate: false,
            narration_timeout_ms: 2_000,
            seed: 42,
        }
    }
}

impl CoordinatorConfig {
    pub fn turn_budget(&self) -> Duration {
        Duration::from_millis(self.turn_budget_ms)
    }

    /// Share of the turn budget granted to a phase
    pub fn phase_slice(&self, share: f32) -> Duration {
        self.turn_budget().mul_f32(share.clamp(0.0, 1.0))
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analyzer: AnalyzerConfig,
    pub damage: DamageConfig,
    pub pipeline: PipelineConfig,
    pub coordinator: CoordinatorConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.workers == 0 {
            return Err(EngineError::Config("pipeline.workers must be at least 1".into()));
        }
        if p.cache_capacity == 0 {
            return Err(EngineError::Config(
                "pipeline.cache_capacity must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&p.fallback_confidence) {
            return Err(EngineError::Config(format!(
                "pipeline.fallback_confidence ({}) must be within [0, 1]",
                p.fallback_confidence
            )));
        }

        let t = &p.tier_timeouts;
        if t.critical_ms == 0 || t.critical_ms > t.high_ms || t.high_ms > t.normal_ms || t.normal_ms > t.low_ms {
            return Err(EngineError::Config(format!(
                "tier timeouts must be positive and ordered critical <= high <= normal <= low ({}, {}, {}, {})",
                t.critical_ms, t.high_ms, t.normal_ms, t.low_ms
            )));
        }

        let c = &self.coordinator;
        if c.turn_budget_ms == 0 {
            return Err(EngineError::Config("coordinator.turn_budget_ms must be positive".into()));
        }
        let shares = c.analyze_share + c.plan_share + c.delegate_share;
        if shares > 1.0 + f32::EPSILON || c.analyze_share < 0.0 || c.plan_share < 0.0 || c.delegate_share <= 0.0 {
            return Err(EngineError::Config(format!(
                "phase shares must be non-negative and sum to at most 1.0 (got {shares:.2})"
            )));
        }

        let a = &self.analyzer;
        if a.neutral_floor < 0.0 || a.contest_margin < 0.0 {
            return Err(EngineError::Config(
                "analyzer margins must be non-negative".into(),
            ));
        }
        if self.damage.armor_scale <= 0.0 {
            return Err(EngineError::Config("damage.armor_scale must be positive".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.cache_capacity, 1000);
        assert_eq!(config.pipeline.cache_ttl(), Duration::from_secs(5));
        assert_eq!(config.coordinator.turn_budget(), Duration::from_millis(100));
    }

    #[test]
    fn test_tier_timeouts() {
        let t = TierTimeouts::default();
        assert_eq!(t.for_tier(PriorityTier::Critical), Duration::from_millis(50));
        assert_eq!(t.for_tier(PriorityTier::High), Duration::from_millis(100));
        assert_eq!(t.for_tier(PriorityTier::Normal), Duration::from_millis(200));
        assert_eq!(t.for_tier(PriorityTier::Low), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [pipeline]
            workers = 8

            [coordinator]
            turn_budget_ms = 250
            default_archetype = "aggressive"
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.cache_capacity, 1000);
        assert_eq!(config.coordinator.turn_budget_ms, 250);
        assert_eq!(config.coordinator.default_archetype, Archetype::Aggressive);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = EngineConfig::default();
        config.pipeline.workers = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_rejects_unordered_tiers() {
        let mut config = EngineConfig::default();
        config.pipeline.tier_timeouts.high_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversubscribed_phases() {
        let mut config = EngineConfig::default();
        config.coordinator.delegate_share = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[damage]\narmor_scale = 50.0").expect("write config");
        let config = EngineConfig::load(file.path()).expect("load config");
        assert_eq!(config.damage.armor_scale, 50.0);
        assert_eq!(config.damage.guaranteed_fraction, 0.1);
    }
}
