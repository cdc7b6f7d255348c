//! Candidate action generation
//!
//! Lists the legal options for the focus unit. Scoring happens later in the
//! evaluator; everything generated here starts with zero confidence.

use crate::battlefield::{CandidateAction, UnitView};
use crate::core::types::Position;
use crate::tactics::{DamageModel, TacticalSituation};
use crate::tools::{AbilityEffect, UnitDetail};

/// Flanking cells considered per decision
const MAX_FLANK_CANDIDATES: usize = 3;

/// Action points needed to move and then act
const MOVE_AND_ACT_AP: u32 = 2;

/// All options for the focus unit
///
/// A unit with no action points gets no candidates; the controller turns
/// that into a wait.
pub fn generate_candidates(
    situation: &TacticalSituation,
    detail: Option<&UnitDetail>,
    damage: &DamageModel,
) -> Vec<CandidateAction> {
    let focus = &situation.focus;
    if !focus.is_alive() || focus.action_points == 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    let can_move_and_act = focus.action_points >= MOVE_AND_ACT_AP;
    let reachable = situation.reachable_cells();

    // Attacks from where we stand
    for enemy in situation.enemies_within(focus.position, focus.attributes.attack_range) {
        out.push(
            CandidateAction::attack(enemy.id, enemy.position)
                .with_expected_damage(damage.attack_damage(focus, enemy)),
        );
    }

    // Move then attack, for targets out of range now
    if can_move_and_act {
        for enemy in &situation.enemies {
            if focus.position.distance(&enemy.position) <= focus.attributes.attack_range {
                continue;
            }
            if let Some(cell) = safest_cell_within(situation, &reachable, enemy.position, focus.attributes.attack_range) {
                out.push(
                    CandidateAction::attack(enemy.id, enemy.position)
                        .with_move(cell)
                        .with_expected_damage(damage.attack_damage(focus, enemy)),
                );
            }
        }
    }

    // Flanking positions
    for flank in situation.flanking.iter().take(MAX_FLANK_CANDIDATES) {
        if flank.position == focus.position {
            continue;
        }
        out.push(CandidateAction::move_to(flank.position));
    }

    // Close the distance when nothing is in reach
    if let Some(nearest) = situation.nearest_enemy() {
        let current = focus.position.distance(&nearest.position);
        if current > focus.reach() {
            let best = reachable
                .iter()
                .filter(|c| **c != focus.position)
                .min_by(|a, b| {
                    a.distance(&nearest.position)
                        .cmp(&b.distance(&nearest.position))
                        .then_with(|| situation.threat_at(**a).total_cmp(&situation.threat_at(**b)))
                        .then_with(|| a.cmp(b))
                });
            if let Some(cell) = best {
                if cell.distance(&nearest.position) < current {
                    out.push(CandidateAction::move_to(*cell));
                }
            }
        }
    }

    // Fall back to the safest reachable cell
    let here = situation.focus_threat();
    if here > 0.0 {
        let safest = reachable
            .iter()
            .filter(|c| **c != focus.position)
            .min_by(|a, b| {
                situation
                    .threat_at(**a)
                    .total_cmp(&situation.threat_at(**b))
                    .then_with(|| a.cmp(b))
            });
        if let Some(cell) = safest {
            if situation.threat_at(*cell) < here && !out.iter().any(|c| c.move_to == Some(*cell) && c.target_unit.is_none()) {
                out.push(CandidateAction::move_to(*cell));
            }
        }
    }

    out.push(CandidateAction::defend(focus.position));

    if let Some(detail) = detail {
        push_abilities(&mut out, situation, detail, damage);
    }

    out
}

fn push_abilities(
    out: &mut Vec<CandidateAction>,
    situation: &TacticalSituation,
    detail: &UnitDetail,
    damage: &DamageModel,
) {
    let focus = &situation.focus;
    for ability in detail.usable_abilities() {
        match ability.effect {
            AbilityEffect::Damage => {
                for enemy in situation.enemies_within(focus.position, ability.range) {
                    let expected = damage.expected_damage(ability.power as f32, enemy.attributes.defense as f32);
                    out.push(
                        CandidateAction::ability(ability.name.clone(), Some(enemy.id), enemy.position, ability.range)
                            .with_expected_damage(expected),
                    );
                }
            }
            AbilityEffect::Heal => {
                let wounded = std::iter::once(focus)
                    .chain(situation.allies_within(focus.position, ability.range))
                    .filter(|u| u.hp < u.max_hp);
                for ally in wounded {
                    out.push(CandidateAction::ability(ability.name.clone(), Some(ally.id), ally.position, ability.range));
                }
            }
        }
    }
}

/// Lowest-threat reachable cell within `range` of `target`
fn safest_cell_within(
    situation: &TacticalSituation,
    reachable: &[Position],
    target: Position,
    range: u32,
) -> Option<Position> {
    reachable
        .iter()
        .filter(|c| **c != situation.focus.position && c.distance(&target) <= range)
        .min_by(|a, b| {
            situation
                .threat_at(**a)
                .total_cmp(&situation.threat_at(**b))
                .then_with(|| a.cmp(b))
        })
        .copied()
}

/// Whether `unit` could strike `target` this turn from `from`
pub fn can_strike(unit: &UnitView, from: Position, target: Position) -> bool {
    from.distance(&target) <= unit.attributes.attack_range
}
