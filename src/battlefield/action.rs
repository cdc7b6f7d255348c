//! Candidate actions produced by evaluators and frozen into decisions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::battlefield::UnitView;
use crate::core::types::{Position, UnitId};

/// Confidence in an action, always within [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Confidence(f32);

impl Confidence {
    /// Clamp into [0, 1]; NaN becomes 0
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for Confidence {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

/// What a unit does with its turn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Attack,
    Ability(String),
    Defend,
    Wait,
}

impl ActionKind {
    /// Bucket used for per-kind statistics
    pub fn category(&self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Attack => "attack",
            ActionKind::Ability(_) => "ability",
            ActionKind::Defend => "defend",
            ActionKind::Wait => "wait",
        }
    }

    /// Whether the action needs a write after the optional movement
    pub fn needs_primary_write(&self) -> bool {
        matches!(self, ActionKind::Attack | ActionKind::Ability(_) | ActionKind::Defend)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Ability(name) => write!(f, "ability:{name}"),
            other => f.write_str(other.category()),
        }
    }
}

/// A ranked option for one unit's turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAction {
    pub kind: ActionKind,
    /// Movement issued before the primary action
    pub move_to: Option<Position>,
    pub targets: Vec<Position>,
    pub target_unit: Option<UnitId>,
    pub priority: u8,
    pub confidence: Confidence,
    pub rationale: String,
    /// Damage the action is expected to deal (0 for non-offensive actions)
    pub expected_damage: f32,
    /// Range the primary action was planned with, when it is not the basic attack range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reach: Option<u32>,
}

impl CandidateAction {
    fn base(kind: ActionKind) -> Self {
        Self {
            kind,
            move_to: None,
            targets: Vec::new(),
            target_unit: None,
            priority: 0,
            confidence: Confidence::default(),
            rationale: String::new(),
            expected_damage: 0.0,
            reach: None,
        }
    }

    pub fn wait(rationale: impl Into<String>) -> Self {
        Self::base(ActionKind::Wait).with_rationale(rationale)
    }

    pub fn attack(target: UnitId, at: Position) -> Self {
        let mut action = Self::base(ActionKind::Attack);
        action.target_unit = Some(target);
        action.targets.push(at);
        action
    }

    pub fn ability(name: impl Into<String>, target: Option<UnitId>, at: Position, range: u32) -> Self {
        let mut action = Self::base(ActionKind::Ability(name.into()));
        action.target_unit = target;
        action.targets.push(at);
        action.reach = Some(range);
        action
    }

    pub fn move_to(destination: Position) -> Self {
        let mut action = Self::base(ActionKind::Move);
        action.move_to = Some(destination);
        action.targets.push(destination);
        action
    }

    pub fn defend(at: Position) -> Self {
        let mut action = Self::base(ActionKind::Defend);
        action.targets.push(at);
        action
    }

    pub fn with_move(mut self, destination: Position) -> Self {
        self.move_to = Some(destination);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Confidence::new(confidence);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_expected_damage(mut self, damage: f32) -> Self {
        self.expected_damage = damage.max(0.0);
        self
    }

    /// Cell the unit ends its turn on, if it moves
    pub fn destination(&self) -> Option<Position> {
        self.move_to
    }

    pub fn is_wait(&self) -> bool {
        self.kind == ActionKind::Wait
    }

    /// Whether `unit`, as it stands now, can carry the action out
    ///
    /// The move must be within the unit's move range, and the first target
    /// within reach of the cell the unit ends on.
    pub fn is_legal_for(&self, unit: &UnitView) -> bool {
        if let Some(dest) = self.move_to {
            if unit.position.distance(&dest) > unit.attributes.move_range {
                return false;
            }
        }
        let origin = self.move_to.unwrap_or(unit.position);
        match self.kind {
            ActionKind::Attack | ActionKind::Ability(_) => {
                let reach = self.reach.unwrap_or(unit.attributes.attack_range);
                self.targets.first().is_some_and(|t| origin.distance(t) <= reach)
            }
            ActionKind::Move => self.move_to.is_some(),
            ActionKind::Defend | ActionKind::Wait => true,
        }
    }

    /// Same action with its movement removed, used when the move is contested
    pub fn without_move(&self) -> Self {
        let mut action = self.clone();
        action.move_to = None;
        if action.kind == ActionKind::Move {
            action.targets.clear();
        }
        action
    }
}
