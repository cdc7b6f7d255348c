//! Tactical Situation Analyzer
//!
//! Turns a snapshot into a `TacticalSituation` for one focus unit. Pure:
//! the snapshot is only read. Grid-sized maps fan out over rayon once the
//! grid is large enough to pay for it.

use ahash::AHashSet;
use rayon::prelude::*;

use crate::battlefield::{BattlefieldSnapshot, UnitView};
use crate::core::config::{AnalyzerConfig, DamageConfig};
use crate::core::error::{EngineError, Result};
use crate::core::types::{GridSize, Position, TeamId, UnitId};
use crate::tactics::damage::DamageModel;
use crate::tactics::formation::{centroid, classify_formation};
use crate::tactics::situation::{
    ControlMap, ControlZone, FlankingOpportunity, TacticalSituation, ThreatMap,
};
use crate::tactics::threat::cell_threat;

/// Flanking score before adjustments
const FLANK_BASE: f32 = 0.4;
/// Flanking bonus scale for a wounded target
const FLANK_WOUND_BONUS: f32 = 0.3;
/// Flanking penalty when the cell is too exposed
const FLANK_EXPOSURE_PENALTY: f32 = 0.5;
/// Flanking bonus per supporting ally
const FLANK_SUPPORT_BONUS: f32 = 0.1;
/// Radius in which an ally counts as support
const FLANK_SUPPORT_RADIUS: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct TacticalAnalyzer {
    config: AnalyzerConfig,
    damage: DamageModel,
}

impl TacticalAnalyzer {
    pub fn new(config: AnalyzerConfig, damage: DamageConfig) -> Self {
        Self {
            config,
            damage: DamageModel::new(damage),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn damage_model(&self) -> &DamageModel {
        &self.damage
    }

    /// Build the situation around `focus`
    ///
    /// Fails only when the focus unit is absent from the snapshot.
    pub fn analyze(&self, snapshot: &BattlefieldSnapshot, focus: UnitId) -> Result<TacticalSituation> {
        let unit = snapshot
            .unit(focus)
            .cloned()
            .ok_or(EngineError::UnknownUnit(focus))?;

        let allies: Vec<UnitView> = snapshot
            .allies_of(unit.team)
            .filter(|u| u.id != focus)
            .cloned()
            .collect();
        let enemies: Vec<UnitView> = snapshot.enemies_of(unit.team).cloned().collect();

        let threat_map = self.threat_map(snapshot, unit.team);
        let control = self.control_map(snapshot, unit.team);
        let flanking = self.flanking_opportunities(&unit, &allies, &enemies, &threat_map, snapshot);

        let ally_positions: Vec<Position> = snapshot.allies_of(unit.team).map(|u| u.position).collect();
        let enemy_positions: Vec<Position> = enemies.iter().map(|u| u.position).collect();
        let ally_formation = classify_formation(
            &ally_positions,
            centroid(&enemy_positions),
            self.config.line_tolerance,
        );
        let enemy_formation = classify_formation(
            &enemy_positions,
            centroid(&ally_positions),
            self.config.line_tolerance,
        );

        let momentum = momentum(snapshot.allies_of(unit.team), snapshot.enemies_of(unit.team));
        let occupied: AHashSet<Position> = snapshot.living().map(|u| u.position).collect();

        tracing::trace!(
            unit = %focus,
            enemies = enemies.len(),
            flanks = flanking.len(),
            momentum,
            "Situation analyzed"
        );

        Ok(TacticalSituation {
            focus: unit,
            turn: snapshot.turn,
            grid: snapshot.grid,
            threat_map,
            control,
            ally_formation,
            enemy_formation,
            flanking,
            momentum,
            allies,
            enemies,
            occupied,
        })
    }

    /// Threat faced by `team` on every cell of the grid
    pub fn threat_map(&self, snapshot: &BattlefieldSnapshot, team: TeamId) -> ThreatMap {
        let enemies: Vec<&UnitView> = snapshot.enemies_of(team).collect();
        let values = self.fill_grid(snapshot.grid, |cell| {
            cell_threat(cell, enemies.iter().copied(), &self.config)
        });
        ThreatMap::new(snapshot.grid, values)
    }

    /// Control zones from the point of view of `team`
    pub fn control_map(&self, snapshot: &BattlefieldSnapshot, team: TeamId) -> ControlMap {
        let allies: Vec<Position> = snapshot.allies_of(team).map(|u| u.position).collect();
        let enemies: Vec<Position> = snapshot.enemies_of(team).map(|u| u.position).collect();
        let zones = self.fill_grid(snapshot.grid, |cell| {
            let ours = influence(cell, &allies, self.config.influence_radius);
            let theirs = influence(cell, &enemies, self.config.influence_radius);
            classify_cell(ours, theirs, &self.config)
        });
        ControlMap::new(snapshot.grid, zones)
    }

    fn flanking_opportunities(
        &self,
        focus: &UnitView,
        allies: &[UnitView],
        enemies: &[UnitView],
        threat: &ThreatMap,
        snapshot: &BattlefieldSnapshot,
    ) -> Vec<FlankingOpportunity> {
        let allowance = if focus.action_points == 0 {
            0
        } else {
            focus.attributes.move_range
        };

        let mut found: Vec<FlankingOpportunity> = enemies
            .iter()
            .flat_map(|enemy| enemy.position.neighbors8().into_iter().map(move |cell| (enemy, cell)))
            .filter(|(_, cell)| {
                focus.position.distance(cell) <= allowance
                    && (*cell == focus.position || snapshot.is_free(*cell))
            })
            .map(|(enemy, cell)| {
                let mut score = FLANK_BASE + (1.0 - enemy.hp_ratio()) * FLANK_WOUND_BONUS;
                if threat.at(cell) > self.config.threat_ceiling {
                    score -= FLANK_EXPOSURE_PENALTY;
                }
                let support = allies
                    .iter()
                    .filter(|a| a.position.distance(&cell) <= FLANK_SUPPORT_RADIUS)
                    .count();
                score += support as f32 * FLANK_SUPPORT_BONUS;
                FlankingOpportunity {
                    position: cell,
                    target: enemy.id,
                    score: score.clamp(0.0, 1.0),
                }
            })
            .collect();

        found.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        found
    }

    fn fill_grid<T, F>(&self, grid: GridSize, per_cell: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Position) -> T + Sync + Send,
    {
        let cells = grid.cell_count();
        if cells >= self.config.parallel_threshold {
            (0..cells)
                .into_par_iter()
                .map(|i| per_cell(grid.position_of(i)))
                .collect()
        } else {
            (0..cells).map(|i| per_cell(grid.position_of(i))).collect()
        }
    }
}

/// Linearly decaying presence, zero beyond `radius`
fn influence(cell: Position, sources: &[Position], radius: u32) -> f32 {
    let falloff = (radius + 1) as f32;
    sources
        .iter()
        .map(|p| p.distance(&cell))
        .filter(|d| *d <= radius)
        .map(|d| 1.0 - d as f32 / falloff)
        .sum()
}

fn classify_cell(ours: f32, theirs: f32, config: &AnalyzerConfig) -> ControlZone {
    if ours < config.neutral_floor && theirs < config.neutral_floor {
        ControlZone::Neutral
    } else if (ours - theirs).abs() < config.contest_margin {
        ControlZone::Contested
    } else if ours > theirs {
        ControlZone::Ally
    } else {
        ControlZone::Enemy
    }
}

/// Balance of remaining strength in [-1, 1]
///
/// Strength is the sum of hp ratios of living units; 0 when both sides are empty.
pub fn momentum<'a>(
    allies: impl IntoIterator<Item = &'a UnitView>,
    enemies: impl IntoIterator<Item = &'a UnitView>,
) -> f32 {
    let ours = strength(allies);
    let theirs = strength(enemies);
    let total = ours + theirs;
    if total <= f32::EPSILON {
        0.0
    } else {
        ((ours - theirs) / total).clamp(-1.0, 1.0)
    }
}

fn strength<'a>(units: impl IntoIterator<Item = &'a UnitView>) -> f32 {
    units
        .into_iter()
        .filter(|u| u.is_alive())
        .map(|u| u.hp_ratio())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::UnitAttributes;
    use crate::tactics::situation::Formation;
    use proptest::prelude::*;

    fn unit(id: u32, team: u8, x: i32, y: i32) -> UnitView {
        UnitView::new(UnitId(id), TeamId(team), Position::new(x, y))
    }

    fn skirmish_snapshot() -> BattlefieldSnapshot {
        BattlefieldSnapshot::new(
            vec![
                unit(1, 0, 2, 2),
                unit(2, 0, 3, 2),
                unit(10, 1, 2, 5).with_hp(20, 50),
                unit(11, 1, 9, 9),
            ],
            GridSize::new(10, 10),
            3,
        )
    }

    #[test]
    fn test_unknown_focus_fails() {
        let analyzer = TacticalAnalyzer::default();
        let err = analyzer.analyze(&skirmish_snapshot(), UnitId(99)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownUnit(UnitId(99))));
    }

    #[test]
    fn test_analyze_does_not_mutate_snapshot() {
        let analyzer = TacticalAnalyzer::default();
        let snapshot = skirmish_snapshot();
        let before = snapshot.clone();
        let situation = analyzer.analyze(&snapshot, UnitId(1)).unwrap();
        assert_eq!(snapshot, before);
        assert_eq!(situation.turn, 3);
        assert_eq!(situation.allies.len(), 1);
        assert_eq!(situation.enemies.len(), 2);
    }

    #[test]
    fn test_threat_is_highest_next_to_enemy() {
        let analyzer = TacticalAnalyzer::default();
        let map = analyzer.threat_map(&skirmish_snapshot(), TeamId(0));
        let adjacent = map.at(Position::new(2, 4));
        let distant = map.at(Position::new(9, 0));
        assert!(adjacent > distant);
        assert_eq!(map.at(Position::new(-1, 0)), 0.0);
    }

    #[test]
    fn test_control_zones() {
        let analyzer = TacticalAnalyzer::default();
        let snapshot = BattlefieldSnapshot::new(
            vec![unit(1, 0, 0, 0), unit(2, 1, 8, 0)],
            GridSize::new(9, 1),
            1,
        );
        let control = analyzer.control_map(&snapshot, TeamId(0));
        assert_eq!(control.at(Position::new(0, 0)), ControlZone::Ally);
        assert_eq!(control.at(Position::new(8, 0)), ControlZone::Enemy);
        assert_eq!(control.at(Position::new(4, 0)), ControlZone::Neutral);
    }

    #[test]
    fn test_equal_presence_is_contested() {
        let analyzer = TacticalAnalyzer::default();
        let snapshot = BattlefieldSnapshot::new(
            vec![unit(1, 0, 0, 0), unit(2, 1, 4, 0)],
            GridSize::new(5, 1),
            1,
        );
        let control = analyzer.control_map(&snapshot, TeamId(0));
        assert_eq!(control.at(Position::new(2, 0)), ControlZone::Contested);
    }

    #[test]
    fn test_flanking_prefers_wounded_targets() {
        let analyzer = TacticalAnalyzer::default();
        let situation = analyzer.analyze(&skirmish_snapshot(), UnitId(1)).unwrap();
        assert!(!situation.flanking.is_empty());
        let best = situation.flanking[0];
        assert_eq!(best.target, UnitId(10));
        assert!(best.score > 0.4);
        for flank in &situation.flanking {
            assert!((0.0..=1.0).contains(&flank.score));
            assert!(Position::new(2, 2).distance(&flank.position) <= 3);
        }
    }

    #[test]
    fn test_exposed_flank_is_penalised() {
        let config = AnalyzerConfig {
            threat_ceiling: 0.0,
            ..AnalyzerConfig::default()
        };
        let analyzer = TacticalAnalyzer::new(config, DamageConfig::default());
        let situation = analyzer.analyze(&skirmish_snapshot(), UnitId(1)).unwrap();
        let wounded: Vec<_> = situation
            .flanking
            .iter()
            .filter(|f| f.target == UnitId(10))
            .collect();
        assert!(!wounded.is_empty());
        assert!(wounded.iter().all(|f| f.score < 0.4));
    }

    #[test]
    fn test_no_action_points_means_no_flanks() {
        let analyzer = TacticalAnalyzer::default();
        let snapshot = skirmish_snapshot();
        let tired = snapshot.unit(UnitId(1)).cloned().unwrap().with_action_points(0);
        let snapshot = snapshot.with_unit(tired);
        let situation = analyzer.analyze(&snapshot, UnitId(1)).unwrap();
        assert!(situation.flanking.is_empty());
        assert_eq!(situation.reachable_cells(), vec![Position::new(2, 2)]);
    }

    #[test]
    fn test_formations_and_momentum() {
        let analyzer = TacticalAnalyzer::default();
        let situation = analyzer.analyze(&skirmish_snapshot(), UnitId(1)).unwrap();
        assert_eq!(situation.ally_formation, Some(Formation::Phalanx));
        assert_eq!(situation.enemy_formation, Some(Formation::Skirmish));
        // 2.0 vs 1.4 of health
        assert!((situation.momentum - 0.6 / 3.4).abs() < 1e-4);
    }

    #[test]
    fn test_momentum_bounds() {
        let a = unit(1, 0, 0, 0);
        let none: [&UnitView; 0] = [];
        assert_eq!(momentum([&a], none), 1.0);
        assert_eq!(momentum(none, [&a]), -1.0);
        assert_eq!(momentum(none, none), 0.0);
    }

    #[test]
    fn test_parallel_and_serial_maps_agree() {
        let serial = TacticalAnalyzer::default();
        let parallel = TacticalAnalyzer::new(
            AnalyzerConfig {
                parallel_threshold: 1,
                ..AnalyzerConfig::default()
            },
            DamageConfig::default(),
        );
        let snapshot = skirmish_snapshot();
        assert_eq!(
            serial.threat_map(&snapshot, TeamId(0)),
            parallel.threat_map(&snapshot, TeamId(0))
        );
        assert_eq!(
            serial.control_map(&snapshot, TeamId(0)),
            parallel.control_map(&snapshot, TeamId(0))
        );
    }

    fn arb_snapshot() -> impl Strategy<Value = BattlefieldSnapshot> {
        (2u32..12, 2u32..12).prop_flat_map(|(w, h)| {
            let unit = (0..w as i32, 0..h as i32, 0u8..2, 0u32..60, 1u32..8, 1u32..4);
            prop::collection::vec(unit, 1..8).prop_map(move |raw| {
                let units = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, (x, y, team, hp, attack, reach))| {
                        UnitView::new(UnitId(i as u32), TeamId(team), Position::new(x, y))
                            .with_hp(hp, 60)
                            .with_attributes(UnitAttributes {
                                attack,
                                defense: 3,
                                move_range: reach,
                                attack_range: reach,
                            })
                    })
                    .collect();
                BattlefieldSnapshot::new(units, GridSize::new(w, h), 1)
            })
        })
    }

    proptest! {
        #[test]
        fn test_threat_never_negative(snapshot in arb_snapshot()) {
            let analyzer = TacticalAnalyzer::default();
            let situation = analyzer.analyze(&snapshot, UnitId(0)).unwrap();
            for (_, value) in situation.threat_map.iter() {
                prop_assert!(value >= 0.0);
            }
            prop_assert!((-1.0..=1.0).contains(&situation.momentum));
            for flank in &situation.flanking {
                prop_assert!((0.0..=1.0).contains(&flank.score));
            }
        }
    }
}
