//! Behavioral archetypes loaded from TOML
//!
//! An archetype carries an immutable trait record plus scoring weights.
//! Adaptation never edits a record in place; it produces a new one.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};

/// Largest change a single adjustment may apply to one trait
pub const MAX_TRAIT_SHIFT: f32 = 0.2;

/// Default directory holding `<name>.toml` archetype files
pub const ARCHETYPE_DIR: &str = "data/archetypes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Aggressive,
    Defensive,
    /// Positional play: flanks, combos and control
    Tactical,
    /// Re-weights its traits against the opponent's observed pattern
    Adaptive,
}

impl Archetype {
    pub const ALL: [Archetype; 4] = [
        Archetype::Aggressive,
        Archetype::Defensive,
        Archetype::Tactical,
        Archetype::Adaptive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Archetype::Aggressive => "aggressive",
            Archetype::Defensive => "defensive",
            Archetype::Tactical => "tactical",
            Archetype::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Archetype {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aggressive" => Ok(Archetype::Aggressive),
            "defensive" => Ok(Archetype::Defensive),
            "tactical" | "positional" => Ok(Archetype::Tactical),
            "adaptive" => Ok(Archetype::Adaptive),
            other => Err(EngineError::Config(format!("unknown archetype '{other}'"))),
        }
    }
}

/// Behavioral tendencies (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitRecord {
    /// Tendency to attack vs hold (0.0 = passive, 1.0 = relentless)
    pub aggression: f32,
    /// Willingness to end a turn on threatened cells
    pub risk_tolerance: f32,
    /// Weight given to setups that pay off later (flanks, combos)
    pub planning_horizon: f32,
    /// How quickly traits follow a counter-strategy
    pub adaptability: f32,
}

impl Default for TraitRecord {
    fn default() -> Self {
        Self {
            aggression: 0.5,
            risk_tolerance: 0.5,
            planning_horizon: 0.5,
            adaptability: 0.3,
        }
    }
}

/// Requested change to a trait record; each field is bounded when applied
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TraitDelta {
    pub aggression: f32,
    pub risk_tolerance: f32,
    pub planning_horizon: f32,
}

impl TraitRecord {
    /// New record with `delta` applied, each shift bounded to
    /// `MAX_TRAIT_SHIFT` and each trait clamped to [0, 1]
    pub fn adjusted(&self, delta: TraitDelta) -> Self {
        let shift = |value: f32, d: f32| {
            let d = if d.is_finite() { d } else { 0.0 };
            (value + d.clamp(-MAX_TRAIT_SHIFT, MAX_TRAIT_SHIFT)).clamp(0.0, 1.0)
        };
        Self {
            aggression: shift(self.aggression, delta.aggression),
            risk_tolerance: shift(self.risk_tolerance, delta.risk_tolerance),
            planning_horizon: shift(self.planning_horizon, delta.planning_horizon),
            adaptability: self.adaptability.clamp(0.0, 1.0),
        }
    }

    /// Same record with every trait clamped to [0, 1]
    pub fn clamped(&self) -> Self {
        self.adjusted(TraitDelta::default())
    }
}

/// Tie-break used when two candidates score the same
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPriority {
    /// Prefer the candidate dealing more damage
    Damage,
    /// Prefer the candidate ending on the safer cell
    Survival,
    #[default]
    Balanced,
}

/// Per-category multipliers applied by the evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub attack: f32,
    /// Extra weight for an expected kill
    pub kill: f32,
    pub flank: f32,
    pub defend: f32,
    pub retreat: f32,
    pub advance: f32,
    pub ability: f32,
    pub heal: f32,
    /// Penalty scale for ending on threatened cells
    pub threat_aversion: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            attack: 1.0,
            kill: 1.0,
            flank: 1.0,
            defend: 1.0,
            retreat: 1.0,
            advance: 1.0,
            ability: 1.0,
            heal: 1.0,
            threat_aversion: 1.0,
        }
    }
}

/// Complete archetype definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchetypeProfile {
    /// Name of this profile (set from filename)
    #[serde(default)]
    pub name: String,
    pub archetype: Archetype,
    #[serde(default)]
    pub traits: TraitRecord,
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub target_priority: TargetPriority,
}

impl ArchetypeProfile {
    /// Built-in profile used when no file is present
    pub fn preset(archetype: Archetype) -> Self {
        let (traits, weights, target_priority) = match archetype {
            Archetype::Aggressive => (
                TraitRecord {
                    aggression: 0.85,
                    risk_tolerance: 0.7,
                    planning_horizon: 0.3,
                    adaptability: 0.2,
                },
                ScoringWeights {
                    attack: 1.2,
                    kill: 1.0,
                    flank: 0.8,
                    defend: 0.4,
                    retreat: 0.3,
                    advance: 1.0,
                    ability: 0.9,
                    heal: 0.5,
                    threat_aversion: 0.5,
                },
                TargetPriority::Damage,
            ),
            Archetype::Defensive => (
                TraitRecord {
                    aggression: 0.25,
                    risk_tolerance: 0.2,
                    planning_horizon: 0.6,
                    adaptability: 0.2,
                },
                ScoringWeights {
                    attack: 0.8,
                    kill: 0.8,
                    flank: 0.4,
                    defend: 1.2,
                    retreat: 1.0,
                    advance: 0.4,
                    ability: 0.8,
                    heal: 1.0,
                    threat_aversion: 1.3,
                },
                TargetPriority::Survival,
            ),
            Archetype::Tactical => (
                TraitRecord {
                    aggression: 0.5,
                    risk_tolerance: 0.45,
                    planning_horizon: 0.8,
                    adaptability: 0.3,
                },
                ScoringWeights {
                    attack: 1.0,
                    kill: 0.9,
                    flank: 1.3,
                    defend: 0.8,
                    retreat: 0.7,
                    advance: 0.7,
                    ability: 1.0,
                    heal: 0.8,
                    threat_aversion: 1.0,
                },
                TargetPriority::Balanced,
            ),
            Archetype::Adaptive => (
                TraitRecord {
                    aggression: 0.5,
                    risk_tolerance: 0.5,
                    planning_horizon: 0.5,
                    adaptability: 0.6,
                },
                ScoringWeights::default(),
                TargetPriority::Balanced,
            ),
        };
        Self {
            name: archetype.name().to_string(),
            archetype,
            traits,
            weights,
            target_priority,
        }
    }

    /// File-backed profile when one exists, otherwise the preset
    pub fn resolve(archetype: Archetype) -> Self {
        match load_archetype(archetype.name()) {
            Ok(profile) if profile.archetype == archetype => profile,
            Ok(profile) => {
                tracing::warn!(
                    file = archetype.name(),
                    declared = %profile.archetype,
                    "Archetype file declares a different archetype, using preset"
                );
                Self::preset(archetype)
            }
            Err(e) => {
                tracing::debug!(archetype = %archetype, error = %e, "Using built-in archetype preset");
                Self::preset(archetype)
            }
        }
    }
}

/// Load an archetype profile from `data/archetypes/{name}.toml`
pub fn load_archetype(name: &str) -> Result<ArchetypeProfile> {
    load_archetype_from(ARCHETYPE_DIR, name)
}

/// Load an archetype profile from `{dir}/{name}.toml`
pub fn load_archetype_from(dir: impl AsRef<Path>, name: &str) -> Result<ArchetypeProfile> {
    let path = archetype_path(dir.as_ref(), name);
    let contents = fs::read_to_string(&path).map_err(|e| {
        EngineError::Config(format!("failed to read archetype file {}: {e}", path.display()))
    })?;

    let mut profile: ArchetypeProfile = toml::from_str(&contents)?;
    profile.name = name.to_string();
    profile.traits = profile.traits.clamped();
    Ok(profile)
}

fn archetype_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.toml"))
}
