//! Strategy evaluators
//!
//! `StrategyEvaluator` is the seam: one implementation per behavioral
//! archetype, all scoring the same candidate list with archetype-weighted
//! rules. Ties are broken by the profile's target-priority mode.

use std::cmp::Ordering;

use ahash::AHashSet;
use serde::Serialize;

use crate::battlefield::{ActionKind, CandidateAction, Confidence};
use crate::core::types::{Position, UnitId};
use crate::strategy::archetype::{Archetype, ArchetypeProfile, TargetPriority, TraitRecord};
use crate::tactics::{ControlZone, FlankingOpportunity, TacticalSituation};

/// Threat value at which a cell counts as half-dangerous
const THREAT_SCALE: f32 = 20.0;
/// Scores closer than this are considered tied
const TIE_EPSILON: f32 = 1e-3;
/// Flanking opportunities below this score are not worth signalling
const FLANK_SIGNAL_FLOOR: f32 = 0.5;
/// Safe positions reported per decision
const MAX_SAFE_POSITIONS: usize = 3;

/// Archetype-specific reading of a situation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SituationSignals {
    /// Enemies worth finishing, weakest first
    pub vulnerable_targets: Vec<UnitId>,
    /// Reachable cells safer than the current one, safest first
    pub safe_positions: Vec<Position>,
    pub flank_opportunities: Vec<FlankingOpportunity>,
    /// Enemies an ally can also reach this turn
    pub combo_targets: Vec<UnitId>,
    /// Danger on the focus cell in [0, 1)
    pub pressure: f32,
}

/// Everything `choose_action` needs besides the candidates
#[derive(Debug, Clone)]
pub struct SituationSummary<'a> {
    pub situation: &'a TacticalSituation,
    pub signals: SituationSignals,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub action: CandidateAction,
    /// Unclamped score; confidence is this clamped to [0, 1]
    pub score: f32,
    pub rationale: String,
}

impl ScoredCandidate {
    /// Freeze into an action carrying its confidence and rationale
    pub fn into_action(self) -> CandidateAction {
        let confidence = self.score;
        self.action
            .with_confidence(confidence)
            .with_rationale(self.rationale)
    }
}

/// Chosen action with its confidence and rationale
#[derive(Debug, Clone)]
pub struct Choice {
    pub action: CandidateAction,
    pub confidence: Confidence,
    pub rationale: String,
}

pub trait StrategyEvaluator: Send + Sync {
    fn archetype(&self) -> Archetype;

    fn target_priority(&self) -> TargetPriority;

    fn evaluate_situation(&self, situation: &TacticalSituation) -> SituationSignals;

    /// Raw score and rationale for one candidate
    fn score(&self, candidate: &CandidateAction, summary: &SituationSummary<'_>) -> (f32, String);

    /// Candidates sorted best first
    fn rank(&self, candidates: &[CandidateAction], summary: &SituationSummary<'_>) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|c| {
                let (score, rationale) = self.score(c, summary);
                ScoredCandidate {
                    action: c.clone(),
                    score,
                    rationale,
                }
            })
            .collect();
        sort_ranked(&mut scored, self.target_priority(), summary.situation);
        scored
    }

    fn choose_action(&self, candidates: &[CandidateAction], summary: &SituationSummary<'_>) -> Option<Choice> {
        self.rank(candidates, summary).into_iter().next().map(|best| Choice {
            confidence: Confidence::new(best.score),
            rationale: best.rationale.clone(),
            action: best.into_action(),
        })
    }
}

/// Stable best-first sort with target-priority tie-break
pub fn sort_ranked(scored: &mut [ScoredCandidate], priority: TargetPriority, situation: &TacticalSituation) {
    scored.sort_by(|a, b| {
        if (a.score - b.score).abs() > TIE_EPSILON {
            return b.score.total_cmp(&a.score);
        }
        tie_break(&a.action, &b.action, priority, situation)
    });
}

fn tie_break(a: &CandidateAction, b: &CandidateAction, priority: TargetPriority, situation: &TacticalSituation) -> Ordering {
    let end_threat = |c: &CandidateAction| situation.threat_at(c.destination().unwrap_or(situation.focus.position));
    match priority {
        TargetPriority::Damage => b.expected_damage.total_cmp(&a.expected_damage),
        TargetPriority::Survival => end_threat(a).total_cmp(&end_threat(b)),
        TargetPriority::Balanced => {
            let value = |c: &CandidateAction| c.expected_damage - 0.5 * end_threat(c);
            value(b).total_cmp(&value(a))
        }
    }
}

/// Map a raw threat value into [0, 1)
pub fn risk_of(threat: f32) -> f32 {
    let threat = threat.max(0.0);
    threat / (threat + THREAT_SCALE)
}

/// Evaluator driven by an archetype profile and a trait record
#[derive(Debug, Clone)]
pub struct ArchetypeEvaluator {
    profile: ArchetypeProfile,
    traits: TraitRecord,
}

impl ArchetypeEvaluator {
    pub fn new(profile: ArchetypeProfile) -> Self {
        let traits = profile.traits;
        Self { profile, traits }
    }

    /// Same evaluator with a replacement trait record
    pub fn with_traits(&self, traits: TraitRecord) -> Self {
        Self {
            profile: self.profile.clone(),
            traits: traits.clamped(),
        }
    }

    pub fn profile(&self) -> &ArchetypeProfile {
        &self.profile
    }

    pub fn traits(&self) -> TraitRecord {
        self.traits
    }

    fn score_attack(
        &self,
        candidate: &CandidateAction,
        summary: &SituationSummary<'_>,
        weight: f32,
        reasons: &mut Vec<String>,
    ) -> f32 {
        let w = &self.profile.weights;
        let t = &self.traits;
        let Some(target) = candidate.target_unit.and_then(|id| summary.situation.enemy(id)) else {
            return 0.0;
        };

        let kill = (candidate.expected_damage / target.hp.max(1) as f32).min(1.0);
        let mut score = weight * (0.3 + 0.4 * kill);
        if kill >= 1.0 {
            score += w.kill * 0.3;
            reasons.push("lethal".into());
        }
        if summary.signals.vulnerable_targets.contains(&target.id) {
            score += 0.1;
            reasons.push("vulnerable".into());
        }
        if summary.signals.combo_targets.contains(&target.id) {
            score += 0.1 * t.planning_horizon;
            reasons.push("combo".into());
        }
        if let Some(dest) = candidate.destination() {
            if let Some(flank) = summary
                .signals
                .flank_opportunities
                .iter()
                .find(|f| f.position == dest && f.target == target.id)
            {
                score += w.flank * flank.score * 0.2;
                reasons.push("flanking".into());
            }
        }
        if self.profile.archetype == Archetype::Aggressive {
            score += 0.05;
        }
        score * (0.5 + 0.5 * t.aggression)
    }

    fn score_heal(&self, candidate: &CandidateAction, summary: &SituationSummary<'_>) -> f32 {
        let situation = summary.situation;
        let patient = candidate.target_unit.and_then(|id| {
            if id == situation.focus.id {
                Some(&situation.focus)
            } else {
                situation.allies.iter().find(|a| a.id == id)
            }
        });
        match patient {
            Some(p) => self.profile.weights.heal * (0.2 + 0.7 * (1.0 - p.hp_ratio())),
            None => 0.0,
        }
    }

    fn score_move(&self, dest: Position, summary: &SituationSummary<'_>, reasons: &mut Vec<String>) -> f32 {
        let situation = summary.situation;
        let focus = &situation.focus;
        let w = &self.profile.weights;
        let t = &self.traits;

        if let Some(flank) = summary.signals.flank_opportunities.iter().find(|f| f.position == dest) {
            reasons.push(format!("flank {}", flank.target));
            let tactical = if self.profile.archetype == Archetype::Tactical { 0.1 } else { 0.0 };
            return w.flank * (0.2 + 0.4 * flank.score) * (0.5 + 0.5 * t.planning_horizon) + tactical;
        }

        let here = situation.focus_threat();
        let there = situation.threat_at(dest);
        if there < here && summary.signals.safe_positions.contains(&dest) {
            reasons.push("withdraw".into());
            let desperation = summary.signals.pressure * (1.0 - focus.hp_ratio());
            let mut score = w.retreat * (0.1 + 0.6 * desperation + 0.3 * summary.signals.pressure) * (1.0 - 0.5 * t.aggression);
            if self.profile.archetype == Archetype::Aggressive && focus.hp_ratio() > 0.25 {
                score *= 0.5;
            }
            return score;
        }

        let Some(nearest) = situation.nearest_enemy() else {
            return 0.05;
        };
        let before = focus.position.distance(&nearest.position) as f32;
        let after = dest.distance(&nearest.position) as f32;
        let closing = ((before - after) / focus.attributes.move_range.max(1) as f32).clamp(-1.0, 1.0);
        reasons.push(format!("advance on {}", nearest.id));
        w.advance * 0.35 * closing * (0.5 + 0.5 * t.aggression)
    }
}

impl StrategyEvaluator for ArchetypeEvaluator {
    fn archetype(&self) -> Archetype {
        self.profile.archetype
    }

    fn target_priority(&self) -> TargetPriority {
        self.profile.target_priority
    }

    fn evaluate_situation(&self, situation: &TacticalSituation) -> SituationSignals {
        let focus = &situation.focus;
        let t = &self.traits;

        // More aggressive profiles see more targets as worth finishing
        let hp_cutoff = 0.3 + 0.3 * t.aggression;
        let mut vulnerable: Vec<_> = situation
            .enemies
            .iter()
            .filter(|e| e.position.distance(&focus.position) <= focus.reach() + 1)
            .filter(|e| e.hp_ratio() <= hp_cutoff)
            .collect();
        vulnerable.sort_by(|a, b| a.hp.cmp(&b.hp).then_with(|| a.id.cmp(&b.id)));

        let here = situation.focus_threat();
        let mut safe: Vec<Position> = situation
            .reachable_cells()
            .into_iter()
            .filter(|c| *c != focus.position && situation.threat_at(*c) < here)
            .collect();
        safe.sort_by(|a, b| situation.threat_at(*a).total_cmp(&situation.threat_at(*b)).then_with(|| a.cmp(b)));
        if self.profile.archetype == Archetype::Defensive {
            // Cells held by our side first
            safe.sort_by_key(|c| situation.control.at(*c) != ControlZone::Ally);
        }
        safe.truncate(MAX_SAFE_POSITIONS);

        let flanks: Vec<FlankingOpportunity> = situation
            .flanking
            .iter()
            .filter(|f| f.score >= FLANK_SIGNAL_FLOOR)
            .copied()
            .collect();

        let ally_reach: AHashSet<UnitId> = situation
            .enemies
            .iter()
            .filter(|e| situation.allies.iter().any(|a| a.position.distance(&e.position) <= a.reach()))
            .map(|e| e.id)
            .collect();
        let mut combo: Vec<UnitId> = situation
            .enemies
            .iter()
            .filter(|e| ally_reach.contains(&e.id) && e.position.distance(&focus.position) <= focus.reach())
            .map(|e| e.id)
            .collect();
        combo.sort();

        SituationSignals {
            vulnerable_targets: vulnerable.into_iter().map(|e| e.id).collect(),
            safe_positions: safe,
            flank_opportunities: flanks,
            combo_targets: combo,
            pressure: risk_of(here),
        }
    }

    fn score(&self, candidate: &CandidateAction, summary: &SituationSummary<'_>) -> (f32, String) {
        let situation = summary.situation;
        let w = &self.profile.weights;
        let t = &self.traits;
        let mut reasons = Vec::new();

        let mut score = match &candidate.kind {
            ActionKind::Attack => self.score_attack(candidate, summary, w.attack, &mut reasons),
            ActionKind::Ability(_) => {
                let hostile = candidate
                    .target_unit
                    .map(|id| situation.enemy(id).is_some())
                    .unwrap_or(false);
                if hostile {
                    self.score_attack(candidate, summary, w.ability, &mut reasons)
                } else {
                    reasons.push("heal".into());
                    self.score_heal(candidate, summary)
                }
            }
            ActionKind::Defend => {
                reasons.push("hold position".into());
                let mut s = w.defend * (0.2 + 0.5 * summary.signals.pressure) * (1.0 - 0.5 * t.aggression);
                if self.profile.archetype == Archetype::Defensive
                    && situation.control.at(situation.focus.position) == ControlZone::Ally
                {
                    s += 0.1;
                }
                s
            }
            ActionKind::Move => match candidate.destination() {
                Some(dest) => self.score_move(dest, summary, &mut reasons),
                None => 0.0,
            },
            ActionKind::Wait => 0.05,
        };

        // Exposure of the cell the unit ends on
        let end = candidate.destination().unwrap_or(situation.focus.position);
        let exposure = risk_of(situation.threat_at(end));
        score -= exposure * (1.0 - t.risk_tolerance) * w.threat_aversion * 0.3;

        let target = candidate
            .target_unit
            .map(|id| format!(" {id}"))
            .unwrap_or_default();
        let rationale = if reasons.is_empty() {
            format!("{} {}{target}", self.profile.archetype, candidate.kind)
        } else {
            format!("{} {}{target}: {}", self.profile.archetype, candidate.kind, reasons.join(", "))
        };
        (score, rationale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::{BattlefieldSnapshot, UnitAttributes, UnitView};
    use crate::core::types::{GridSize, TeamId};
    use crate::strategy::candidates::generate_candidates;
    use crate::tactics::{DamageModel, TacticalAnalyzer};

    fn scenario(enemy_hp: u32) -> TacticalSituation {
        let attrs = UnitAttributes {
            attack: 10,
            defense: 5,
            move_range: 2,
            attack_range: 1,
        };
        let me = UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0))
            .with_action_points(2)
            .with_attributes(attrs);
        let enemy = UnitView::new(UnitId(2), TeamId(1), Position::new(0, 1))
            .with_hp(enemy_hp, 50)
            .with_attributes(attrs);
        let snapshot = BattlefieldSnapshot::new(vec![me, enemy], GridSize::new(8, 8), 1);
        TacticalAnalyzer::default().analyze(&snapshot, UnitId(1)).unwrap()
    }

    fn choose(evaluator: &ArchetypeEvaluator, situation: &TacticalSituation) -> Choice {
        let candidates = generate_candidates(situation, None, &DamageModel::default());
        let summary = SituationSummary {
            situation,
            signals: evaluator.evaluate_situation(situation),
        };
        evaluator.choose_action(&candidates, &summary).expect("a choice")
    }

    #[test]
    fn test_aggressive_finishes_wounded_enemy() {
        let evaluator = ArchetypeEvaluator::new(ArchetypeProfile::preset(Archetype::Aggressive));
        let situation = scenario(10);
        let signals = evaluator.evaluate_situation(&situation);
        assert_eq!(signals.vulnerable_targets, vec![UnitId(2)]);

        let choice = choose(&evaluator, &situation);
        assert_eq!(choice.action.kind, ActionKind::Attack);
        assert_eq!(choice.action.target_unit, Some(UnitId(2)));
        assert!(choice.confidence.value() >= 0.6);
        assert!(choice.rationale.contains("lethal"));
    }

    #[test]
    fn test_healthy_enemy_is_not_vulnerable() {
        let evaluator = ArchetypeEvaluator::new(ArchetypeProfile::preset(Archetype::Defensive));
        let signals = evaluator.evaluate_situation(&scenario(50));
        assert!(signals.vulnerable_targets.is_empty());
        assert!(signals.pressure > 0.0);
    }

    #[test]
    fn test_confidence_always_in_unit_range() {
        for archetype in Archetype::ALL {
            let evaluator = ArchetypeEvaluator::new(ArchetypeProfile::preset(archetype));
            for hp in [1, 10, 25, 50] {
                let situation = scenario(hp);
                let candidates = generate_candidates(&situation, None, &DamageModel::default());
                let summary = SituationSummary {
                    situation: &situation,
                    signals: evaluator.evaluate_situation(&situation),
                };
                for scored in evaluator.rank(&candidates, &summary) {
                    let action = scored.into_action();
                    assert!((0.0..=1.0).contains(&action.confidence.value()));
                }
            }
        }
    }

    #[test]
    fn test_ranking_is_best_first() {
        let evaluator = ArchetypeEvaluator::new(ArchetypeProfile::preset(Archetype::Tactical));
        let situation = scenario(30);
        let candidates = generate_candidates(&situation, None, &DamageModel::default());
        let summary = SituationSummary {
            situation: &situation,
            signals: evaluator.evaluate_situation(&situation),
        };
        let ranked = evaluator.rank(&candidates, &summary);
        assert_eq!(ranked.len(), candidates.len());
        for pair in ranked.windows(2) {
            assert!(pair[0].score + TIE_EPSILON >= pair[1].score);
        }
    }

    #[test]
    fn test_traits_shift_preferences() {
        let base = ArchetypeEvaluator::new(ArchetypeProfile::preset(Archetype::Adaptive));
        let situation = scenario(50);
        let summary = SituationSummary {
            situation: &situation,
            signals: base.evaluate_situation(&situation),
        };
        let attack = CandidateAction::attack(UnitId(2), Position::new(0, 1)).with_expected_damage(10.0);

        let timid = base.with_traits(TraitRecord {
            aggression: 0.0,
            ..base.traits()
        });
        let bold = base.with_traits(TraitRecord {
            aggression: 1.0,
            ..base.traits()
        });
        assert!(bold.score(&attack, &summary).0 > timid.score(&attack, &summary).0);
    }

    #[test]
    fn test_tie_break_by_target_priority() {
        let situation = scenario(50);
        let cheap = CandidateAction::attack(UnitId(2), Position::new(0, 1)).with_expected_damage(5.0);
        let heavy = CandidateAction::attack(UnitId(2), Position::new(0, 1)).with_expected_damage(9.0);
        let mut scored = vec![
            ScoredCandidate {
                action: cheap,
                score: 0.5,
                rationale: String::new(),
            },
            ScoredCandidate {
                action: heavy,
                score: 0.5,
                rationale: String::new(),
            },
        ];
        sort_ranked(&mut scored, TargetPriority::Damage, &situation);
        assert_eq!(scored[0].action.expected_damage, 9.0);
    }
}
