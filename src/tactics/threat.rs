//! Threat scoring
//!
//! Two views of danger: how dangerous a single cell is for one side
//! (`cell_threat`, summed into the threat map) and how dangerous a single
//! unit is to its opponents (`estimate_unit_threat`, used to rank targets).

use crate::battlefield::{BattlefieldSnapshot, UnitView};
use crate::core::config::AnalyzerConfig;
use crate::core::types::Position;
use crate::tactics::damage::DamageModel;

/// Bonus per opponent the unit could strike this turn
const THREAT_PER_TARGET: f32 = 5.0;

/// Weight of one enemy's offensive power at `cell`
///
/// 1.0 inside current attack range, 0.7 inside next-turn reach,
/// awareness weight inside the awareness radius, otherwise 0.
pub fn threat_weight(enemy: &UnitView, cell: Position, config: &AnalyzerConfig) -> f32 {
    let d = enemy.position.distance(&cell);
    if d <= enemy.attributes.attack_range {
        config.weight_in_range
    } else if d <= enemy.reach() {
        config.weight_reachable
    } else if d <= config.awareness_radius {
        config.weight_aware
    } else {
        0.0
    }
}

/// Summed threat of `enemies` at `cell`; never negative
pub fn cell_threat<'a>(
    cell: Position,
    enemies: impl IntoIterator<Item = &'a UnitView>,
    config: &AnalyzerConfig,
) -> f32 {
    enemies
        .into_iter()
        .filter(|e| e.is_alive())
        .map(|e| e.offensive_power() * threat_weight(e, cell, config).max(0.0))
        .sum()
}

/// Threat a unit poses to the opposing side
///
/// Offensive power scaled by remaining health, plus a bonus for every
/// opponent currently within reach. Kill potential counts double.
pub fn estimate_unit_threat(
    unit: &UnitView,
    snapshot: &BattlefieldSnapshot,
    damage: &DamageModel,
) -> f32 {
    if !unit.is_alive() {
        return 0.0;
    }
    let base = unit.offensive_power() * (0.5 + 0.5 * unit.hp_ratio());
    let targets: f32 = snapshot
        .enemies_of(unit.team)
        .filter(|opp| unit.position.distance(&opp.position) <= unit.reach())
        .map(|opp| {
            if damage.is_lethal(unit, opp) {
                THREAT_PER_TARGET * 2.0
            } else {
                THREAT_PER_TARGET
            }
        })
        .sum();
    base + targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::UnitAttributes;
    use crate::core::types::{GridSize, TeamId, UnitId};

    fn enemy_at(x: i32, y: i32) -> UnitView {
        UnitView::new(UnitId(9), TeamId(1), Position::new(x, y)).with_attributes(UnitAttributes {
            attack: 10,
            defense: 5,
            move_range: 2,
            attack_range: 1,
        })
    }

    #[test]
    fn test_threat_weight_bands() {
        let config = AnalyzerConfig::default();
        let enemy = enemy_at(5, 5);
        assert_eq!(threat_weight(&enemy, Position::new(5, 6), &config), 1.0);
        assert_eq!(threat_weight(&enemy, Position::new(5, 8), &config), 0.7);
        assert_eq!(threat_weight(&enemy, Position::new(5, 10), &config), 0.3);
        assert_eq!(threat_weight(&enemy, Position::new(5, 11), &config), 0.0);
    }

    #[test]
    fn test_cell_threat_sums_living_enemies() {
        let config = AnalyzerConfig::default();
        let a = enemy_at(0, 1);
        let b = enemy_at(1, 0);
        let dead = enemy_at(1, 1).with_hp(0, 50);
        let total = cell_threat(Position::new(0, 0), [&a, &b, &dead], &config);
        assert!((total - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_unit_threat_rewards_targets_in_reach() {
        let damage = DamageModel::default();
        let attacker = UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0));
        let near = UnitView::new(UnitId(2), TeamId(1), Position::new(0, 2));
        let far = UnitView::new(UnitId(3), TeamId(1), Position::new(9, 9));

        let grid = GridSize::new(10, 10);
        let lonely = BattlefieldSnapshot::new(vec![attacker.clone(), far.clone()], grid, 1);
        let engaged = BattlefieldSnapshot::new(vec![attacker.clone(), near, far], grid, 1);

        let base = estimate_unit_threat(&attacker, &lonely, &damage);
        assert!((base - 10.0).abs() < 1e-4);
        assert!(estimate_unit_threat(&attacker, &engaged, &damage) > base);
    }

    #[test]
    fn test_dead_unit_is_harmless() {
        let damage = DamageModel::default();
        let dead = UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0)).with_hp(0, 50);
        let snapshot = BattlefieldSnapshot::new(vec![dead.clone()], GridSize::new(4, 4), 1);
        assert_eq!(estimate_unit_threat(&dead, &snapshot, &damage), 0.0);
    }
}
