//! Tool Access Layer
//!
//! Closed, statically-checked interfaces the engine uses to read and write
//! authoritative game state. Reads and writes are split so that an agent
//! holding only read access cannot queue actions by construction.
//!
//! All calls are synchronous and may fail; failures are recoverable at the
//! caller and never fatal to the process.

pub mod frozen;
pub mod local;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::battlefield::{ActionKind, BattlefieldSnapshot, UnitView};
use crate::core::types::{Position, UnitId};

pub use frozen::FrozenBattlefield;
pub use local::{LocalBattlefield, QueuedAction, TurnResolution};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("game state unavailable: {0}")]
    Unavailable(String),

    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
}

/// Effect of an ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityEffect {
    Damage,
    Heal,
}

/// Special action a unit may spend MP on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    pub name: String,
    pub mp_cost: u32,
    pub range: u32,
    pub power: u32,
    pub effect: AbilityEffect,
}

/// Full detail of one unit as reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDetail {
    pub view: UnitView,
    pub abilities: Vec<Ability>,
    pub statuses: Vec<String>,
}

impl UnitDetail {
    /// Abilities the unit can pay for right now
    pub fn usable_abilities(&self) -> impl Iterator<Item = &Ability> {
        let mp = self.view.mp;
        self.abilities.iter().filter(move |a| a.mp_cost <= mp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreatScore {
    pub unit: UnitId,
    pub score: f32,
}

/// Operations an agent may be permitted to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOperation {
    ReadState,
    ReadUnit,
    ReadThreat,
    QueueAction,
    CancelAction,
}

impl ToolOperation {
    pub const READS: [ToolOperation; 3] = [
        ToolOperation::ReadState,
        ToolOperation::ReadUnit,
        ToolOperation::ReadThreat,
    ];

    pub fn is_write(self) -> bool {
        matches!(self, ToolOperation::QueueAction | ToolOperation::CancelAction)
    }
}

/// Read side of the Tool Access Layer
pub trait BattlefieldQuery: Send + Sync {
    fn battlefield_state(&self) -> Result<BattlefieldSnapshot, ToolError>;

    fn unit_detail(&self, id: UnitId) -> Result<UnitDetail, ToolError>;

    fn calculate_threat(&self, id: UnitId) -> Result<ThreatScore, ToolError>;
}

/// Write side of the Tool Access Layer
pub trait UnitCommands: Send + Sync {
    /// Queue an action for a unit; `false` means the host refused it
    fn queue_unit_action(
        &self,
        id: UnitId,
        kind: &ActionKind,
        targets: &[Position],
        priority: u8,
    ) -> bool;

    /// Remove the action at `index` of the unit's queue
    fn cancel_unit_action(&self, id: UnitId, index: usize) -> bool;
}

/// Both halves of the Tool Access Layer
pub trait ToolAccess: BattlefieldQuery + UnitCommands {}

impl<T: BattlefieldQuery + UnitCommands> ToolAccess for T {}
