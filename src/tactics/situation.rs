//! Derived, read-only picture of the battlefield around one unit
//!
//! Built fresh for every decision and discarded afterwards.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::battlefield::UnitView;
use crate::core::types::{GridSize, Position, TurnNumber, UnitId};

/// Dense position -> threat score map covering the whole grid
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatMap {
    grid: GridSize,
    values: Vec<f32>,
}

impl ThreatMap {
    pub(crate) fn new(grid: GridSize, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), grid.cell_count());
        Self { grid, values }
    }

    /// Threat at `pos`; cells outside the grid carry none
    pub fn at(&self, pos: Position) -> f32 {
        self.grid
            .index_of(pos)
            .and_then(|i| self.values.get(i).copied())
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Position, f32)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.grid.position_of(i), *v))
    }
}

/// Which side dominates a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlZone {
    Ally,
    Enemy,
    Contested,
    Neutral,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlMap {
    grid: GridSize,
    zones: Vec<ControlZone>,
}

impl ControlMap {
    pub(crate) fn new(grid: GridSize, zones: Vec<ControlZone>) -> Self {
        debug_assert_eq!(zones.len(), grid.cell_count());
        Self { grid, zones }
    }

    pub fn at(&self, pos: Position) -> ControlZone {
        self.grid
            .index_of(pos)
            .and_then(|i| self.zones.get(i).copied())
            .unwrap_or(ControlZone::Neutral)
    }

    pub fn count(&self, zone: ControlZone) -> usize {
        self.zones.iter().filter(|z| **z == zone).count()
    }
}

/// Shape of a group of units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formation {
    /// Tight block, every pair within 3 cells
    Phalanx,
    /// Spread wider than 6 cells
    Skirmish,
    /// Near-collinear
    DefensiveLine,
    /// Surrounds the opposing centroid with no gap of 180 degrees or more
    Encircle,
    Irregular,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlankingOpportunity {
    pub position: Position,
    pub target: UnitId,
    /// Attractiveness in [0, 1]
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct TacticalSituation {
    pub focus: UnitView,
    pub turn: TurnNumber,
    pub grid: GridSize,
    pub threat_map: ThreatMap,
    pub control: ControlMap,
    pub ally_formation: Option<Formation>,
    pub enemy_formation: Option<Formation>,
    /// Sorted by descending score
    pub flanking: Vec<FlankingOpportunity>,
    /// Balance of remaining strength in [-1, 1], positive favours the focus side
    pub momentum: f32,
    /// Living allies, focus excluded
    pub allies: Vec<UnitView>,
    /// Living enemies
    pub enemies: Vec<UnitView>,
    pub(crate) occupied: AHashSet<Position>,
}

impl TacticalSituation {
    pub fn threat_at(&self, pos: Position) -> f32 {
        self.threat_map.at(pos)
    }

    pub fn focus_threat(&self) -> f32 {
        self.threat_at(self.focus.position)
    }

    /// Cells the focus unit can end its move on, its own cell included
    pub fn reachable_cells(&self) -> Vec<Position> {
        let allowance = if self.focus.action_points == 0 {
            0
        } else {
            self.focus.attributes.move_range
        };
        self.grid
            .cells_within(self.focus.position, allowance)
            .into_iter()
            .filter(|c| *c == self.focus.position || !self.occupied.contains(c))
            .collect()
    }

    pub fn enemy(&self, id: UnitId) -> Option<&UnitView> {
        self.enemies.iter().find(|e| e.id == id)
    }

    pub fn nearest_enemy(&self) -> Option<&UnitView> {
        self.enemies
            .iter()
            .min_by_key(|e| (self.focus.position.distance(&e.position), e.id))
    }

    /// Enemies within `range` of `pos`
    pub fn enemies_within(&self, pos: Position, range: u32) -> impl Iterator<Item = &UnitView> {
        self.enemies
            .iter()
            .filter(move |e| e.position.distance(&pos) <= range)
    }

    /// Allies within `range` of `pos`, focus excluded
    pub fn allies_within(&self, pos: Position, range: u32) -> impl Iterator<Item = &UnitView> {
        self.allies
            .iter()
            .filter(move |a| a.position.distance(&pos) <= range)
    }
}
