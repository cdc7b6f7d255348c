//! Battle plans
//!
//! One plan per turn. Assignments only ever reference units present in the
//! snapshot the plan was built from; anything else is dropped and the unit
//! falls back to attacking the nearest enemy.

use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashSet;
use serde::Serialize;

use crate::battlefield::{ActionKind, BattlefieldSnapshot, CandidateAction};
use crate::core::error::EngineError;
use crate::core::types::{Position, TurnNumber, UnitId};
use crate::tactics::{classify_formation, momentum, Formation, TacticalSituation};
use crate::tools::ThreatScore;

const ELIMINATE_BONUS: f32 = 0.15;
const CLOSING_BONUS: f32 = 0.05;
const SUPPORT_BONUS: f32 = 0.1;
const NEAREST_BONUS: f32 = 0.1;
/// Allies below this health ratio count as wounded
const WOUNDED_RATIO: f32 = 0.5;
const SUPPORT_RADIUS: u32 = 2;

/// Per-unit instruction, applied as a soft preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assignment {
    Eliminate(UnitId),
    SupportAllies,
    AttackNearest,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assignment::Eliminate(id) => write!(f, "eliminate:{id}"),
            Assignment::SupportAllies => f.write_str("support-allies"),
            Assignment::AttackNearest => f.write_str("attack-nearest"),
        }
    }
}

impl Serialize for Assignment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Assignment {
    /// Score bonus for `candidate` under this assignment
    pub fn preference_bonus(&self, candidate: &CandidateAction, situation: &TacticalSituation) -> f32 {
        let focus = &situation.focus;
        match *self {
            Assignment::Eliminate(target) => {
                let Some(enemy) = situation.enemy(target) else {
                    return 0.0;
                };
                if candidate.target_unit == Some(target) {
                    return ELIMINATE_BONUS;
                }
                match candidate.destination() {
                    Some(dest) if dest.distance(&enemy.position) < focus.position.distance(&enemy.position) => {
                        CLOSING_BONUS
                    }
                    _ => 0.0,
                }
            }
            Assignment::SupportAllies => {
                let helps_ally = candidate
                    .target_unit
                    .is_some_and(|id| situation.allies.iter().any(|a| a.id == id));
                if helps_ally {
                    return SUPPORT_BONUS;
                }
                let end = candidate.destination().unwrap_or(focus.position);
                let near_wounded = situation
                    .allies_within(end, SUPPORT_RADIUS)
                    .any(|a| a.hp_ratio() < WOUNDED_RATIO);
                match (near_wounded, &candidate.kind) {
                    (true, _) => SUPPORT_BONUS,
                    (false, ActionKind::Defend) => CLOSING_BONUS,
                    _ => 0.0,
                }
            }
            Assignment::AttackNearest => {
                let nearest = situation.nearest_enemy().map(|e| e.id);
                if nearest.is_some() && candidate.target_unit == nearest {
                    NEAREST_BONUS
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Take out the ranked threats
    EliminateThreats,
    /// Nothing left to fight
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationStrategy {
    /// Mass on few targets
    Concentrate,
    /// Work around a compact enemy
    Envelop,
    /// Fall back into a line when losing
    HoldLine,
}

#[derive(Debug, Clone, Serialize)]
pub struct BattlePlan {
    pub turn: TurnNumber,
    pub objective: Objective,
    pub assignments: BTreeMap<UnitId, Assignment>,
    /// Opposing units ranked by threat, highest first
    pub priority_targets: Vec<ThreatScore>,
    pub formation_strategy: FormationStrategy,
}

impl BattlePlan {
    /// Rank threats and hand each controlled unit the highest unmatched one
    ///
    /// Returns the plan plus one `InvalidAssignment` per requested unit that
    /// is absent or dead in `snapshot`.
    pub fn build(
        snapshot: &BattlefieldSnapshot,
        controlled: &[UnitId],
        threats: &[ThreatScore],
    ) -> (Self, Vec<EngineError>) {
        let mut ranked: Vec<ThreatScore> = threats
            .iter()
            .filter(|t| snapshot.unit(t.unit).is_some_and(|u| u.is_alive()))
            .copied()
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.unit.cmp(&b.unit)));

        let mut dropped = Vec::new();
        let mut assignments = BTreeMap::new();
        let mut matched: AHashSet<UnitId> = AHashSet::new();
        for &id in controlled {
            let Some(unit) = snapshot.unit(id).filter(|u| u.is_alive()) else {
                dropped.push(EngineError::InvalidAssignment {
                    unit: id,
                    reason: "unit absent from snapshot".into(),
                });
                continue;
            };
            let target = ranked.iter().find(|t| {
                !matched.contains(&t.unit)
                    && snapshot.unit(t.unit).is_some_and(|enemy| enemy.is_enemy_of(unit))
            });
            let assignment = match target {
                Some(t) => {
                    matched.insert(t.unit);
                    Assignment::Eliminate(t.unit)
                }
                None => Assignment::SupportAllies,
            };
            assignments.insert(id, assignment);
        }

        let objective = if ranked.is_empty() {
            Objective::Hold
        } else {
            Objective::EliminateThreats
        };

        let plan = Self {
            turn: snapshot.turn,
            objective,
            assignments,
            formation_strategy: formation_strategy(snapshot, controlled, &ranked),
            priority_targets: ranked,
        };
        (plan, dropped)
    }

    /// Assignment for `unit`, defaulting to attack-nearest
    pub fn assignment_for(&self, unit: UnitId) -> Assignment {
        self.assignments
            .get(&unit)
            .copied()
            .unwrap_or(Assignment::AttackNearest)
    }

    /// Drop assignments that reference units absent from `snapshot`
    pub fn validate(&mut self, snapshot: &BattlefieldSnapshot) -> Vec<EngineError> {
        let mut dropped = Vec::new();
        self.assignments.retain(|unit, assignment| {
            let reason = if !snapshot.contains(*unit) {
                Some("unit absent from snapshot".to_string())
            } else if let Assignment::Eliminate(target) = assignment {
                (!snapshot.contains(*target)).then(|| format!("target {target} absent from snapshot"))
            } else {
                None
            };
            match reason {
                Some(reason) => {
                    dropped.push(EngineError::InvalidAssignment { unit: *unit, reason });
                    false
                }
                None => true,
            }
        });
        self.priority_targets.retain(|t| snapshot.contains(t.unit));
        dropped
    }

    /// Every unit id the plan mentions
    pub fn referenced_units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.assignments
            .iter()
            .flat_map(|(unit, assignment)| {
                let target = match assignment {
                    Assignment::Eliminate(t) => Some(*t),
                    _ => None,
                };
                std::iter::once(*unit).chain(target)
            })
            .chain(self.priority_targets.iter().map(|t| t.unit))
    }
}

fn formation_strategy(
    snapshot: &BattlefieldSnapshot,
    controlled: &[UnitId],
    ranked: &[ThreatScore],
) -> FormationStrategy {
    let ours: Vec<_> = controlled
        .iter()
        .filter_map(|id| snapshot.unit(*id))
        .filter(|u| u.is_alive())
        .collect();
    let theirs: Vec<_> = ranked.iter().filter_map(|t| snapshot.unit(t.unit)).collect();

    if momentum(ours.iter().copied(), theirs.iter().copied()) < -0.3 {
        return FormationStrategy::HoldLine;
    }
    let enemy_positions: Vec<Position> = theirs.iter().map(|u| u.position).collect();
    match classify_formation(&enemy_positions, None, 1.0) {
        Some(Formation::Phalanx) | Some(Formation::DefensiveLine) if ours.len() >= 2 => {
            FormationStrategy::Envelop
        }
        _ => FormationStrategy::Concentrate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::UnitView;
    use crate::core::types::{GridSize, TeamId};
    use crate::tactics::TacticalAnalyzer;
    use proptest::prelude::*;

    fn snapshot() -> BattlefieldSnapshot {
        BattlefieldSnapshot::new(
            vec![
                UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0)),
                UnitView::new(UnitId(2), TeamId(0), Position::new(1, 0)),
                UnitView::new(UnitId(3), TeamId(0), Position::new(2, 0)),
                UnitView::new(UnitId(10), TeamId(1), Position::new(0, 5)),
                UnitView::new(UnitId(11), TeamId(1), Position::new(3, 5)),
            ],
            GridSize::new(8, 8),
            4,
        )
    }

    fn threats() -> Vec<ThreatScore> {
        vec![
            ThreatScore { unit: UnitId(10), score: 8.0 },
            ThreatScore { unit: UnitId(11), score: 12.0 },
        ]
    }

    #[test]
    fn test_assignment_display() {
        assert_eq!(Assignment::Eliminate(UnitId(7)).to_string(), "eliminate:7");
        assert_eq!(Assignment::SupportAllies.to_string(), "support-allies");
        assert_eq!(Assignment::AttackNearest.to_string(), "attack-nearest");
    }

    #[test]
    fn test_highest_threat_assigned_first() {
        let (plan, dropped) = BattlePlan::build(&snapshot(), &[UnitId(1), UnitId(2), UnitId(3)], &threats());
        assert!(dropped.is_empty());
        assert_eq!(plan.turn, 4);
        assert_eq!(plan.objective, Objective::EliminateThreats);
        assert_eq!(plan.assignment_for(UnitId(1)), Assignment::Eliminate(UnitId(11)));
        assert_eq!(plan.assignment_for(UnitId(2)), Assignment::Eliminate(UnitId(10)));
        assert_eq!(plan.assignment_for(UnitId(3)), Assignment::SupportAllies);
        assert_eq!(plan.priority_targets[0].unit, UnitId(11));
    }

    #[test]
    fn test_absent_unit_is_dropped() {
        let (plan, dropped) = BattlePlan::build(&snapshot(), &[UnitId(1), UnitId(99)], &threats());
        assert_eq!(dropped.len(), 1);
        assert!(matches!(dropped[0], EngineError::InvalidAssignment { unit: UnitId(99), .. }));
        assert!(!plan.assignments.contains_key(&UnitId(99)));
        assert_eq!(plan.assignment_for(UnitId(99)), Assignment::AttackNearest);
    }

    #[test]
    fn test_validate_against_newer_snapshot() {
        let (mut plan, _) = BattlePlan::build(&snapshot(), &[UnitId(1), UnitId(2)], &threats());
        let reduced = BattlefieldSnapshot::new(
            snapshot().units().iter().filter(|u| u.id != UnitId(11)).cloned().collect(),
            GridSize::new(8, 8),
            5,
        );
        let dropped = plan.validate(&reduced);
        assert_eq!(dropped.len(), 1);
        assert_eq!(plan.assignment_for(UnitId(1)), Assignment::AttackNearest);
        assert!(plan.referenced_units().all(|id| reduced.contains(id)));
    }

    #[test]
    fn test_no_enemies_means_hold() {
        let snap = BattlefieldSnapshot::new(
            vec![UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0))],
            GridSize::new(4, 4),
            1,
        );
        let (plan, _) = BattlePlan::build(&snap, &[UnitId(1)], &[]);
        assert_eq!(plan.objective, Objective::Hold);
        assert_eq!(plan.assignment_for(UnitId(1)), Assignment::SupportAllies);
    }

    #[test]
    fn test_preference_bonus() {
        let situation = TacticalAnalyzer::default().analyze(&snapshot(), UnitId(1)).unwrap();
        let hit = CandidateAction::attack(UnitId(10), Position::new(0, 5));
        let closer = CandidateAction::move_to(Position::new(0, 2));
        let defend = CandidateAction::defend(Position::new(0, 0));

        let eliminate = Assignment::Eliminate(UnitId(10));
        assert_eq!(eliminate.preference_bonus(&hit, &situation), ELIMINATE_BONUS);
        assert_eq!(eliminate.preference_bonus(&closer, &situation), CLOSING_BONUS);
        assert_eq!(eliminate.preference_bonus(&defend, &situation), 0.0);

        assert_eq!(Assignment::AttackNearest.preference_bonus(&hit, &situation), NEAREST_BONUS);
        assert_eq!(Assignment::SupportAllies.preference_bonus(&defend, &situation), CLOSING_BONUS);
    }

    proptest! {
        #[test]
        fn test_plan_never_references_absent_units(
            present in prop::collection::vec((0u32..20, 0u8..2, any::<bool>()), 1..10),
            requested in prop::collection::vec(0u32..30, 0..10),
            threat_ids in prop::collection::vec((0u32..30, 0.0f32..50.0), 0..10),
        ) {
            let mut seen = AHashSet::new();
            let units: Vec<UnitView> = present
                .into_iter()
                .filter(|(id, _, _)| seen.insert(*id))
                .map(|(id, team, alive)| {
                    let hp = if alive { 30 } else { 0 };
                    UnitView::new(UnitId(id), TeamId(team), Position::new(id as i32 % 8, id as i32 / 8)).with_hp(hp, 50)
                })
                .collect();
            let snap = BattlefieldSnapshot::new(units, GridSize::new(8, 8), 1);
            let controlled: Vec<UnitId> = requested.into_iter().map(UnitId).collect();
            let threats: Vec<ThreatScore> = threat_ids
                .into_iter()
                .map(|(id, score)| ThreatScore { unit: UnitId(id), score })
                .collect();

            let (plan, _) = BattlePlan::build(&snap, &controlled, &threats);
            for id in plan.referenced_units() {
                prop_assert!(snap.contains(id));
            }
        }
    }
}
