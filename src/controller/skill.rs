//! Skill levels
//!
//! A skill level selects which evaluator features a controller consults.
//! The state machine is the same at every level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    /// Nearest enemy, no evaluator
    Scripted,
    /// Archetype evaluator with plan preferences
    Strategic,
    /// Adds opponent pattern memory and counter-strategy re-weighting
    Adaptive,
    /// Adds per-kind success bias and seeded exploration
    Learning,
}

impl SkillLevel {
    pub const ALL: [SkillLevel; 4] = [
        SkillLevel::Scripted,
        SkillLevel::Strategic,
        SkillLevel::Adaptive,
        SkillLevel::Learning,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SkillLevel::Scripted => "scripted",
            SkillLevel::Strategic => "strategic",
            SkillLevel::Adaptive => "adaptive",
            SkillLevel::Learning => "learning",
        }
    }

    pub fn uses_evaluator(self) -> bool {
        self >= SkillLevel::Strategic
    }

    pub fn uses_pattern_memory(self) -> bool {
        self >= SkillLevel::Adaptive
    }

    pub fn uses_learning(self) -> bool {
        self == SkillLevel::Learning
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SkillLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkillLevel::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::Config(format!("unknown skill level '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_accumulate_with_level() {
        assert!(!SkillLevel::Scripted.uses_evaluator());
        assert!(SkillLevel::Strategic.uses_evaluator());
        assert!(!SkillLevel::Strategic.uses_pattern_memory());
        assert!(SkillLevel::Adaptive.uses_pattern_memory());
        assert!(!SkillLevel::Adaptive.uses_learning());
        assert!(SkillLevel::Learning.uses_pattern_memory());
        assert!(SkillLevel::Learning.uses_learning());
    }

    #[test]
    fn test_parse_skill_level() {
        assert_eq!("Learning".parse::<SkillLevel>().unwrap(), SkillLevel::Learning);
        assert!("expert".parse::<SkillLevel>().is_err());
    }
}
