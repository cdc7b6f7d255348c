//! Opponent pattern memory and counter-strategy re-weighting
//!
//! The adaptive archetype (and the adaptive/learning skill levels) watch how
//! the opposing side moves from turn to turn, classify the pattern, and pull
//! their own traits toward a counter. The pull is gated by the adaptability
//! coefficient and slows down while the current approach is working.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::types::TurnNumber;
use crate::strategy::archetype::{TraitDelta, TraitRecord};
use crate::tactics::{Formation, TacticalSituation};

/// Turns of history kept for classification
const MEMORY_TURNS: usize = 6;
/// Average closing speed (cells per turn) that reads as a rush
const RUSH_CLOSING: f32 = 0.75;
/// Closing speed below which the opponent is holding still
const HOLD_CLOSING: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentPattern {
    /// Closing distance quickly
    Rushing,
    /// Holding a tight or lined-up position
    Turtling,
    /// Spread out, harassing at range
    Skirmishing,
    Balanced,
}

/// One turn's reading of the opposing side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub turn: TurnNumber,
    /// Mean distance from each living enemy to the focus unit
    pub mean_distance: f32,
    pub formation: Option<Formation>,
    pub enemy_count: usize,
}

impl Observation {
    pub fn from_situation(situation: &TacticalSituation) -> Option<Self> {
        if situation.enemies.is_empty() {
            return None;
        }
        let focus = situation.focus.position;
        let total: u32 = situation
            .enemies
            .iter()
            .map(|e| e.position.distance(&focus))
            .sum();
        Some(Self {
            turn: situation.turn,
            mean_distance: total as f32 / situation.enemies.len() as f32,
            formation: situation.enemy_formation,
            enemy_count: situation.enemies.len(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternMemory {
    observations: VecDeque<Observation>,
}

impl PatternMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the opposing side's state; one observation per turn
    pub fn observe(&mut self, situation: &TacticalSituation) {
        let Some(obs) = Observation::from_situation(situation) else {
            return;
        };
        if self.observations.back().map(|o| o.turn) == Some(obs.turn) {
            self.observations.pop_back();
        }
        self.observations.push_back(obs);
        while self.observations.len() > MEMORY_TURNS {
            self.observations.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Average cells per turn the opponent closed; negative when backing off
    pub fn closing_rate(&self) -> Option<f32> {
        let first = self.observations.front()?;
        let last = self.observations.back()?;
        let turns = last.turn.saturating_sub(first.turn);
        if turns == 0 {
            return None;
        }
        Some((first.mean_distance - last.mean_distance) / turns as f32)
    }

    pub fn classify(&self) -> OpponentPattern {
        let Some(latest) = self.observations.back() else {
            return OpponentPattern::Balanced;
        };
        let closing = self.closing_rate();

        if closing.is_some_and(|c| c >= RUSH_CLOSING) {
            return OpponentPattern::Rushing;
        }
        if latest.formation == Some(Formation::Skirmish) {
            return OpponentPattern::Skirmishing;
        }
        let holding = closing.is_some_and(|c| c.abs() < HOLD_CLOSING);
        let compact = matches!(
            latest.formation,
            Some(Formation::Phalanx) | Some(Formation::DefensiveLine)
        );
        if holding && compact {
            return OpponentPattern::Turtling;
        }
        OpponentPattern::Balanced
    }
}

/// Trait profile that counters `pattern`; a balanced opponent keeps the baseline
pub fn counter_strategy(pattern: OpponentPattern, baseline: &TraitRecord) -> TraitRecord {
    let (aggression, risk_tolerance, planning_horizon) = match pattern {
        // Hold ground and let them come into range
        OpponentPattern::Rushing => (0.3, 0.3, 0.7),
        // Work the flanks patiently
        OpponentPattern::Turtling => (0.65, 0.5, 0.85),
        // Close in before they pick us apart
        OpponentPattern::Skirmishing => (0.8, 0.65, 0.4),
        OpponentPattern::Balanced => (
            baseline.aggression,
            baseline.risk_tolerance,
            baseline.planning_horizon,
        ),
    };
    TraitRecord {
        aggression,
        risk_tolerance,
        planning_horizon,
        adaptability: baseline.adaptability,
    }
}

/// Fraction of the remaining gap closed in one adjustment
///
/// `adaptability * (1 - 0.5 * success_rate)`: a winning approach changes slowly.
pub fn adaptation_rate(adaptability: f32, success_rate: f32) -> f32 {
    adaptability.clamp(0.0, 1.0) * (1.0 - 0.5 * success_rate.clamp(0.0, 1.0))
}

/// Pull `current` toward the counter for `pattern`, returning a new record
pub fn adapt(current: &TraitRecord, baseline: &TraitRecord, pattern: OpponentPattern, success_rate: f32) -> TraitRecord {
    let target = counter_strategy(pattern, baseline);
    let rate = adaptation_rate(current.adaptability, success_rate);
    current.adjusted(TraitDelta {
        aggression: (target.aggression - current.aggression) * rate,
        risk_tolerance: (target.risk_tolerance - current.risk_tolerance) * rate,
        planning_horizon: (target.planning_horizon - current.planning_horizon) * rate,
    })
}
