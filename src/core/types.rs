//! Core type definitions used throughout the codebase

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a unit as assigned by the game host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side a unit fights for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u8);

/// Turn counter reported by the host
pub type TurnNumber = u32;

/// Grid cell coordinate (square grid, origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Grid distance used for movement and attack ranges (4-connected)
    pub fn distance(&self, other: &Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// King-move distance; adjacency in the 8-neighbourhood is `chebyshev == 1`
    pub fn chebyshev(&self, other: &Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Straight-line distance, used for formation geometry
    pub fn euclidean(&self, other: &Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// The 8 surrounding cells, clockwise from north
    pub fn neighbors8(&self) -> [Position; 8] {
        let Position { x, y } = *self;
        [
            Position::new(x, y - 1),
            Position::new(x + 1, y - 1),
            Position::new(x + 1, y),
            Position::new(x + 1, y + 1),
            Position::new(x, y + 1),
            Position::new(x - 1, y + 1),
            Position::new(x - 1, y),
            Position::new(x - 1, y - 1),
        ]
    }

    /// One step from self towards `target`, preferring the longer axis
    pub fn step_towards(&self, target: &Self) -> Self {
        let dx = (target.x - self.x).signum();
        let dy = (target.y - self.y).signum();
        if self.x.abs_diff(target.x) >= self.y.abs_diff(target.y) {
            Position::new(self.x + dx, self.y)
        } else {
            Position::new(self.x, self.y + dy)
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Battlefield dimensions in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major index of a cell inside the grid
    pub fn index_of(&self, pos: Position) -> Option<usize> {
        self.contains(pos)
            .then(|| pos.y as usize * self.width as usize + pos.x as usize)
    }

    pub fn position_of(&self, index: usize) -> Position {
        let width = self.width.max(1) as usize;
        Position::new((index % width) as i32, (index / width) as i32)
    }

    /// All cells within `range` grid distance of `center`, clipped to the grid
    pub fn cells_within(&self, center: Position, range: u32) -> Vec<Position> {
        let r = range as i32;
        let mut cells = Vec::new();
        for dy in -r..=r {
            let span = r - dy.abs();
            for dx in -span..=span {
                let pos = Position::new(center.x + dx, center.y + dy);
                if self.contains(pos) {
                    cells.push(pos);
                }
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_metrics() {
        let a = Position::new(0, 0);
        let b = Position::new(3, -4);
        assert_eq!(a.distance(&b), 7);
        assert_eq!(a.chebyshev(&b), 4);
        assert!((a.euclidean(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_neighbors_are_adjacent() {
        let center = Position::new(5, 5);
        for n in center.neighbors8() {
            assert_eq!(center.chebyshev(&n), 1);
        }
    }

    #[test]
    fn test_grid_indexing() {
        let grid = GridSize::new(4, 3);
        assert_eq!(grid.cell_count(), 12);
        assert_eq!(grid.index_of(Position::new(3, 2)), Some(11));
        assert_eq!(grid.index_of(Position::new(4, 0)), None);
        assert_eq!(grid.position_of(6), Position::new(2, 1));
    }

    #[test]
    fn test_cells_within_clips_to_grid() {
        let grid = GridSize::new(3, 3);
        let cells = grid.cells_within(Position::new(0, 0), 1);
        assert_eq!(cells.len(), 3);
        assert!(cells.iter().all(|c| grid.contains(*c)));
    }

    #[test]
    fn test_step_towards() {
        let from = Position::new(0, 0);
        assert_eq!(from.step_towards(&Position::new(5, 1)), Position::new(1, 0));
        assert_eq!(from.step_towards(&Position::new(0, -3)), Position::new(0, -1));
    }
}
