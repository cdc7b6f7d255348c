//! Unit Decision Controller
//!
//! One controller per unit. A decision walks
//! IDLE → GATHERING_CONTEXT → EVALUATING → DECIDED, execution walks
//! DECIDED → EXECUTING → DONE. Any failure before DONE lands in FAILED.
//! Cancellation is checked at every boundary and stops all further writes.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::battlefield::{ActionKind, BattlefieldSnapshot, CandidateAction};
use crate::controller::cancel::CancellationToken;
use crate::controller::memory::{DecisionHistory, KindBias};
use crate::controller::skill::SkillLevel;
use crate::controller::state::ControllerState;
use crate::coordinator::Assignment;
use crate::core::error::{EngineError, Result};
use crate::core::types::{Position, TurnNumber, UnitId};
use crate::pipeline::{ContextFingerprint, DecisionRecord};
use crate::strategy::{
    adapt, generate_candidates, Archetype, ArchetypeEvaluator, ArchetypeProfile, PatternMemory,
    ScoredCandidate, SituationSummary, StrategyEvaluator, TraitRecord,
};
use crate::tactics::{TacticalAnalyzer, TacticalSituation};
use crate::tools::{BattlefieldQuery, ToolError, UnitCommands, UnitDetail};

/// Alternatives kept behind the chosen action for rejected writes
const MAX_ALTERNATIVES: usize = 4;
/// Confidence of the deterministic wait and of scripted choices
const DEFAULT_CONFIDENCE: f32 = 0.5;
/// Confidence multiplier when unit detail could not be read
const DEGRADED_CONFIDENCE: f32 = 0.8;
/// Chance that a learning controller tries its runner-up
const EXPLORATION_RATE: f64 = 0.1;

/// Static settings for one controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub archetype: Archetype,
    pub skill: SkillLevel,
    pub max_write_failures: u32,
    pub seed: u64,
    pub awareness_radius: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            archetype: Archetype::Tactical,
            skill: SkillLevel::Strategic,
            max_write_failures: 3,
            seed: 42,
            awareness_radius: 5,
        }
    }
}

/// Outcome of `decide`
#[derive(Debug, Clone)]
pub struct Decision {
    pub record: DecisionRecord,
    /// Ranked fallbacks tried in order when a write is rejected
    pub alternatives: Vec<CandidateAction>,
}

impl Decision {
    pub fn action(&self) -> &CandidateAction {
        &self.record.action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// All writes for this action were accepted
    Executed(CandidateAction),
    /// Write failure limit reached; the turn is over for this unit
    Exhausted,
    /// Every candidate was rejected before the limit was reached
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub write_attempts: u32,
    pub rejected_writes: u32,
}

/// Counters exposed through agent status
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub unit: UnitId,
    pub archetype: Archetype,
    pub skill_level: SkillLevel,
    pub state: ControllerState,
    pub decisions_made: u64,
    pub success_rate: f32,
    pub traits: TraitRecordView,
}

/// Serializable copy of the live trait record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TraitRecordView {
    pub aggression: f32,
    pub risk_tolerance: f32,
    pub planning_horizon: f32,
}

impl From<TraitRecord> for TraitRecordView {
    fn from(t: TraitRecord) -> Self {
        Self {
            aggression: t.aggression,
            risk_tolerance: t.risk_tolerance,
            planning_horizon: t.planning_horizon,
        }
    }
}

pub struct UnitController {
    unit: UnitId,
    settings: ControllerSettings,
    state: ControllerState,
    analyzer: Arc<TacticalAnalyzer>,
    evaluator: ArchetypeEvaluator,
    baseline: TraitRecord,
    patterns: PatternMemory,
    kind_bias: KindBias,
    rng: ChaCha8Rng,
    history: DecisionHistory,
    decisions_made: u64,
    executions: u64,
    successes: u64,
    consecutive_failures: u32,
}

impl UnitController {
    pub fn new(unit: UnitId, settings: ControllerSettings, analyzer: Arc<TacticalAnalyzer>) -> Self {
        let profile = ArchetypeProfile::resolve(settings.archetype);
        Self::with_profile(unit, settings, profile, analyzer)
    }

    pub fn with_profile(
        unit: UnitId,
        mut settings: ControllerSettings,
        profile: ArchetypeProfile,
        analyzer: Arc<TacticalAnalyzer>,
    ) -> Self {
        settings.archetype = profile.archetype;
        let baseline = profile.traits;
        // Per-unit stream so controllers sharing a seed still differ
        let rng = ChaCha8Rng::seed_from_u64(settings.seed ^ u64::from(unit.0).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        Self {
            unit,
            state: ControllerState::Idle,
            analyzer,
            evaluator: ArchetypeEvaluator::new(profile),
            baseline,
            patterns: PatternMemory::new(),
            kind_bias: KindBias::default(),
            rng,
            history: DecisionHistory::default(),
            decisions_made: 0,
            executions: 0,
            successes: 0,
            consecutive_failures: 0,
            settings,
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn skill(&self) -> SkillLevel {
        self.settings.skill
    }

    pub fn archetype(&self) -> Archetype {
        self.settings.archetype
    }

    pub fn traits(&self) -> TraitRecord {
        self.evaluator.traits()
    }

    pub fn history(&self) -> &DecisionHistory {
        &self.history
    }

    pub fn success_rate(&self) -> f32 {
        if self.executions == 0 {
            0.0
        } else {
            self.successes as f32 / self.executions as f32
        }
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            unit: self.unit,
            archetype: self.settings.archetype,
            skill_level: self.settings.skill,
            state: self.state,
            decisions_made: self.decisions_made,
            success_rate: self.success_rate(),
            traits: self.evaluator.traits().into(),
        }
    }

    /// Reset per-turn state
    pub fn begin_turn(&mut self) {
        self.state = ControllerState::Idle;
        self.consecutive_failures = 0;
    }

    fn transition(&mut self, next: ControllerState) -> Result<()> {
        self.state = self.state.advance(next)?;
        Ok(())
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        if self.state.can_transition_to(ControllerState::Failed) {
            self.state = ControllerState::Failed;
        }
        tracing::debug!(unit = %self.unit, error = %err, "Controller failed");
        err
    }

    /// Check cancellation; a cancelled decision returns to IDLE
    fn checkpoint(&mut self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            self.state = ControllerState::Idle;
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Run one decision up to DECIDED
    ///
    /// Uses `snapshot` when given, otherwise reads one through `query`.
    pub fn decide(
        &mut self,
        query: &dyn BattlefieldQuery,
        snapshot: Option<&BattlefieldSnapshot>,
        assignment: Assignment,
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        // A new decision supersedes whatever the previous one left behind
        self.state = ControllerState::Idle;
        self.checkpoint(cancel)?;
        self.transition(ControllerState::GatheringContext)?;

        let owned;
        let snapshot = match snapshot {
            Some(s) => s,
            None => match query.battlefield_state() {
                Ok(s) => {
                    owned = s;
                    &owned
                }
                Err(e) => return Err(self.fail(e.into())),
            },
        };

        if !snapshot.unit(self.unit).is_some_and(|u| u.is_alive()) {
            return Err(self.fail(EngineError::UnknownUnit(self.unit)));
        }

        let mut degraded = false;
        let detail = match query.unit_detail(self.unit) {
            Ok(d) => Some(d),
            Err(ToolError::UnknownUnit(id)) => return Err(self.fail(EngineError::UnknownUnit(id))),
            Err(e) => {
                tracing::warn!(unit = %self.unit, error = %e, "Unit detail unavailable, deciding without abilities");
                degraded = true;
                None
            }
        };

        let situation = match self.analyzer.analyze(snapshot, self.unit) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };

        self.checkpoint(cancel)?;
        self.transition(ControllerState::Evaluating)?;

        let mut ranked = self.evaluate(&situation, detail.as_ref(), assignment);
        if degraded {
            for scored in &mut ranked {
                scored.score *= DEGRADED_CONFIDENCE;
            }
        }

        self.checkpoint(cancel)?;
        self.transition(ControllerState::Decided)?;

        let mut ranked = ranked.into_iter().map(ScoredCandidate::into_action);
        let chosen = ranked.next().unwrap_or_else(|| {
            CandidateAction::wait("no legal options").with_confidence(DEFAULT_CONFIDENCE)
        });
        let alternatives: Vec<CandidateAction> = ranked.take(MAX_ALTERNATIVES).collect();

        let fingerprint = ContextFingerprint::compute(snapshot, self.unit, self.settings.awareness_radius);
        let record = DecisionRecord::new(self.unit, chosen, fingerprint, snapshot.turn);
        self.history.push(record.clone());
        self.decisions_made += 1;

        tracing::debug!(
            unit = %self.unit,
            turn = snapshot.turn,
            action = %record.action.kind,
            confidence = record.confidence.value(),
            assignment = %assignment,
            "Decision made"
        );

        Ok(Decision { record, alternatives })
    }

    /// Ranked candidates for the current skill level
    fn evaluate(
        &mut self,
        situation: &TacticalSituation,
        detail: Option<&UnitDetail>,
        assignment: Assignment,
    ) -> Vec<ScoredCandidate> {
        if !self.settings.skill.uses_evaluator() {
            return scripted_choice(situation);
        }

        if self.settings.skill.uses_pattern_memory() || self.settings.archetype == Archetype::Adaptive {
            self.patterns.observe(situation);
            let pattern = self.patterns.classify();
            let next = adapt(&self.evaluator.traits(), &self.baseline, pattern, self.success_rate());
            if next != self.evaluator.traits() {
                tracing::trace!(unit = %self.unit, ?pattern, aggression = next.aggression, "Traits re-weighted");
                self.evaluator = self.evaluator.with_traits(next);
            }
        }

        let candidates = generate_candidates(situation, detail, self.analyzer.damage_model());
        let summary = SituationSummary {
            situation,
            signals: self.evaluator.evaluate_situation(situation),
        };
        let mut ranked = self.evaluator.rank(&candidates, &summary);

        for scored in &mut ranked {
            scored.score += assignment.preference_bonus(&scored.action, situation);
            if self.settings.skill.uses_learning() {
                scored.score += self.kind_bias.bias(&scored.action.kind);
            }
        }
        crate::strategy::evaluator::sort_ranked(&mut ranked, self.evaluator.target_priority(), situation);

        if self.settings.skill.uses_learning() && ranked.len() > 1 && self.rng.gen_bool(EXPLORATION_RATE) {
            tracing::trace!(unit = %self.unit, "Exploring runner-up candidate");
            ranked.swap(0, 1);
        }
        ranked
    }

    /// Take over an action produced elsewhere (cache, precompute or fallback)
    pub fn adopt(&mut self, action: &CandidateAction, turn: TurnNumber) -> Result<Decision> {
        self.state = ControllerState::Idle;
        for next in [
            ControllerState::GatheringContext,
            ControllerState::Evaluating,
            ControllerState::Decided,
        ] {
            self.transition(next)?;
        }
        let record = DecisionRecord::new(self.unit, action.clone(), None, turn);
        self.history.push(record.clone());
        self.decisions_made += 1;
        Ok(Decision {
            record,
            alternatives: Vec::new(),
        })
    }

    /// Swap the action of a decision that has not been executed yet
    ///
    /// Used when coordination overrides the chosen action. The history entry
    /// is replaced rather than appended so the decision is counted once.
    pub fn amend(&mut self, decision: &Decision, action: CandidateAction) -> Result<Decision> {
        if self.state != ControllerState::Decided {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: ControllerState::Decided,
            });
        }
        let record = DecisionRecord::new(self.unit, action, decision.record.fingerprint, decision.record.turn);
        self.history.replace_latest(record.clone());
        let alternatives = decision
            .alternatives
            .iter()
            .filter(|a| a.move_to.is_none() || a.move_to == record.action.move_to)
            .cloned()
            .collect();
        Ok(Decision { record, alternatives })
    }

    /// Issue writes for a decided action
    ///
    /// Per candidate: at most one movement, then at most one primary write.
    /// A rejected write moves on to the next alternative. After the
    /// configured number of consecutive rejections the controller is DONE
    /// and issues nothing more this turn.
    pub fn execute(
        &mut self,
        commands: &dyn UnitCommands,
        decision: &Decision,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport> {
        self.transition(ControllerState::Executing)?;

        let mut report = ExecutionReport {
            outcome: ExecutionOutcome::Rejected,
            write_attempts: 0,
            rejected_writes: 0,
        };
        // Index of our queued move in the host queue, if any
        let mut queued_move: Option<(usize, Position)> = None;
        let mut queued = 0usize;

        let candidates = std::iter::once(decision.action()).chain(decision.alternatives.iter());
        for candidate in candidates {
            if self.consecutive_failures >= self.settings.max_write_failures {
                report.outcome = ExecutionOutcome::Exhausted;
                break;
            }
            if cancel.is_cancelled() {
                report.outcome = ExecutionOutcome::Cancelled;
                break;
            }
            if candidate.is_wait() {
                report.outcome = ExecutionOutcome::Executed(candidate.clone());
                break;
            }

            // Drop a move queued for an earlier candidate that this one does not share
            if let Some((index, dest)) = queued_move {
                if candidate.move_to != Some(dest) {
                    if commands.cancel_unit_action(self.unit, index) {
                        queued -= 1;
                    }
                    queued_move = None;
                }
            }

            if let Some(dest) = candidate.move_to {
                if queued_move.is_none() {
                    report.write_attempts += 1;
                    if commands.queue_unit_action(self.unit, &ActionKind::Move, &[dest], candidate.priority) {
                        queued_move = Some((queued, dest));
                        queued += 1;
                    } else if self.reject(&mut report, candidate) {
                        report.outcome = ExecutionOutcome::Exhausted;
                        break;
                    } else {
                        continue;
                    }
                }
            }

            if candidate.kind.needs_primary_write() {
                if cancel.is_cancelled() {
                    report.outcome = ExecutionOutcome::Cancelled;
                    break;
                }
                report.write_attempts += 1;
                if !commands.queue_unit_action(self.unit, &candidate.kind, &candidate.targets, candidate.priority) {
                    if self.reject(&mut report, candidate) {
                        report.outcome = ExecutionOutcome::Exhausted;
                        break;
                    }
                    continue;
                }
            }

            self.consecutive_failures = 0;
            report.outcome = ExecutionOutcome::Executed(candidate.clone());
            break;
        }

        let success = matches!(report.outcome, ExecutionOutcome::Executed(_));
        self.executions += 1;
        if success {
            self.successes += 1;
        }
        if let ExecutionOutcome::Executed(action) = &report.outcome {
            self.kind_bias.record(&action.kind, true);
        } else {
            self.kind_bias.record(&decision.action().kind, false);
        }

        self.transition(ControllerState::Done)?;
        tracing::debug!(
            unit = %self.unit,
            attempts = report.write_attempts,
            rejected = report.rejected_writes,
            success,
            "Execution finished"
        );
        Ok(report)
    }

    /// Count a rejected write; `true` when the failure limit is reached
    fn reject(&mut self, report: &mut ExecutionReport, candidate: &CandidateAction) -> bool {
        report.rejected_writes += 1;
        self.consecutive_failures += 1;
        tracing::warn!(
            unit = %self.unit,
            action = %candidate.kind,
            failures = self.consecutive_failures,
            "Write rejected"
        );
        self.consecutive_failures >= self.settings.max_write_failures
    }
}

/// Nearest enemy, no evaluator: attack it if possible, else close in
fn scripted_choice(situation: &TacticalSituation) -> Vec<ScoredCandidate> {
    let focus = &situation.focus;
    if focus.action_points == 0 {
        return Vec::new();
    }
    let Some(enemy) = situation.nearest_enemy() else {
        return Vec::new();
    };
    let distance = focus.position.distance(&enemy.position);

    let action = if distance <= focus.attributes.attack_range {
        CandidateAction::attack(enemy.id, enemy.position)
    } else {
        let step = situation
            .reachable_cells()
            .into_iter()
            .min_by_key(|c| (c.distance(&enemy.position), *c))
            .filter(|c| *c != focus.position);
        match step {
            Some(cell) if cell.distance(&enemy.position) <= focus.attributes.attack_range && focus.action_points >= 2 => {
                CandidateAction::attack(enemy.id, enemy.position).with_move(cell)
            }
            Some(cell) => CandidateAction::move_to(cell),
            None => CandidateAction::defend(focus.position),
        }
    };

    let primary = ScoredCandidate {
        rationale: format!("scripted: nearest enemy {}", enemy.id),
        score: DEFAULT_CONFIDENCE,
        action,
    };
    let hold = ScoredCandidate {
        action: CandidateAction::defend(focus.position),
        score: DEFAULT_CONFIDENCE * 0.5,
        rationale: "scripted: hold".into(),
    };
    if primary.action.kind == ActionKind::Defend {
        vec![primary]
    } else {
        vec![primary, hold]
    }
}
