//! Decision priority tiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;

/// Urgency of a decision; each tier carries its own timeout
/// (see `TierTimeouts`: 50 / 100 / 200 / 500 ms by default)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Critical,
    High,
    Normal,
    Low,
}

impl PriorityTier {
    pub fn name(self) -> &'static str {
        match self {
            PriorityTier::Critical => "critical",
            PriorityTier::High => "high",
            PriorityTier::Normal => "normal",
            PriorityTier::Low => "low",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PriorityTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            PriorityTier::Critical,
            PriorityTier::High,
            PriorityTier::Normal,
            PriorityTier::Low,
        ]
        .into_iter()
        .find(|tier| tier.name().eq_ignore_ascii_case(s))
        .ok_or_else(|| EngineError::Config(format!("unknown priority tier '{s}'")))
    }
}
