//! Immutable view of the battlefield handed to the decision engine
//!
//! A snapshot is produced per request by the Tool Access Layer and never
//! mutated afterwards; the engine shares it behind an `Arc`.

use serde::{Deserialize, Serialize};

use crate::core::types::{GridSize, Position, TeamId, TurnNumber, UnitId};

/// Combat-relevant attributes of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAttributes {
    pub attack: u32,
    pub defense: u32,
    /// Cells a unit may move per turn
    pub move_range: u32,
    /// Cells a unit may attack at
    pub attack_range: u32,
}

impl Default for UnitAttributes {
    fn default() -> Self {
        Self {
            attack: 10,
            defense: 5,
            move_range: 3,
            attack_range: 1,
        }
    }
}

/// Value-type view of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    pub id: UnitId,
    pub team: TeamId,
    pub position: Position,
    pub hp: u32,
    pub max_hp: u32,
    pub mp: u32,
    pub max_mp: u32,
    pub action_points: u32,
    pub attributes: UnitAttributes,
}

impl UnitView {
    pub fn new(id: UnitId, team: TeamId, position: Position) -> Self {
        Self {
            id,
            team,
            position,
            hp: 50,
            max_hp: 50,
            mp: 20,
            max_mp: 20,
            action_points: 2,
            attributes: UnitAttributes::default(),
        }
    }

    pub fn with_hp(mut self, hp: u32, max_hp: u32) -> Self {
        self.hp = hp.min(max_hp);
        self.max_hp = max_hp;
        self
    }

    pub fn with_mp(mut self, mp: u32, max_mp: u32) -> Self {
        self.mp = mp.min(max_mp);
        self.max_mp = max_mp;
        self
    }

    pub fn with_action_points(mut self, ap: u32) -> Self {
        self.action_points = ap;
        self
    }

    pub fn with_attributes(mut self, attributes: UnitAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Remaining health as a fraction (0.0 dead, 1.0 full)
    pub fn hp_ratio(&self) -> f32 {
        if self.max_hp == 0 {
            return 0.0;
        }
        self.hp as f32 / self.max_hp as f32
    }

    /// Raw offensive power used by threat estimation
    pub fn offensive_power(&self) -> f32 {
        self.attributes.attack as f32
    }

    /// Cells this unit can strike next turn (move then attack)
    pub fn reach(&self) -> u32 {
        self.attributes.move_range + self.attributes.attack_range
    }

    pub fn is_enemy_of(&self, other: &UnitView) -> bool {
        self.team != other.team
    }
}

/// Immutable battlefield snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlefieldSnapshot {
    units: Vec<UnitView>,
    pub grid: GridSize,
    pub turn: TurnNumber,
}

impl BattlefieldSnapshot {
    pub fn new(units: Vec<UnitView>, grid: GridSize, turn: TurnNumber) -> Self {
        Self { units, grid, turn }
    }

    /// All units in host order, dead ones included
    pub fn units(&self) -> &[UnitView] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitView> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.unit(id).is_some()
    }

    pub fn living(&self) -> impl Iterator<Item = &UnitView> {
        self.units.iter().filter(|u| u.is_alive())
    }

    /// Living units on `team`
    pub fn allies_of(&self, team: TeamId) -> impl Iterator<Item = &UnitView> {
        self.living().filter(move |u| u.team == team)
    }

    /// Living units not on `team`
    pub fn enemies_of(&self, team: TeamId) -> impl Iterator<Item = &UnitView> {
        self.living().filter(move |u| u.team != team)
    }

    /// Living unit standing on `pos`, if any
    pub fn occupant(&self, pos: Position) -> Option<&UnitView> {
        self.living().find(|u| u.position == pos)
    }

    pub fn is_free(&self, pos: Position) -> bool {
        self.grid.contains(pos) && self.occupant(pos).is_none()
    }

    /// Copy of this snapshot with one unit replaced
    ///
    /// Used to derive hypothetical follow-up states; the original is untouched.
    pub fn with_unit(&self, updated: UnitView) -> Self {
        let units = self
            .units
            .iter()
            .map(|u| if u.id == updated.id { updated.clone() } else { u.clone() })
            .collect();
        Self {
            units,
            grid: self.grid,
            turn: self.turn,
        }
    }

    /// Copy of this snapshot with one unit removed
    pub fn without_unit(&self, id: UnitId) -> Self {
        Self {
            units: self.units.iter().filter(|u| u.id != id).cloned().collect(),
            grid: self.grid,
            turn: self.turn,
        }
    }
}
