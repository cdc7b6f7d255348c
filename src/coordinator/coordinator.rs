//! Orchestration Coordinator
//!
//! One coordination pass per turn, in four phases that share a turn-wide
//! budget:
//!
//! 1. Analyze: one snapshot plus a threat score per opposing unit
//! 2. Plan: rank threats and hand out assignments
//! 3. Delegate: one time-boxed decision per controlled unit
//! 4. Finalize: resolve destination conflicts, then execute
//!
//! A misbehaving unit never aborts the pass for the others; every requested
//! unit ends up with an entry in the result.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::battlefield::{ActionKind, BattlefieldSnapshot, CandidateAction};
use crate::controller::{
    CancellationToken, ControllerSettings, ControllerState, ExecutionOutcome, ExecutionReport, SkillLevel,
};
use crate::coordinator::plan::{Assignment, BattlePlan};
use crate::coordinator::profile::AgentProfile;
use crate::coordinator::report::{AgentStatus, PerformanceReport, PhaseTimings, TurnResult, TurnStats, UnitTurnResult};
use crate::coordinator::roster::ControllerRoster;
use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::core::types::{Position, TurnNumber, UnitId};
use crate::llm::{NarrationRequest, Narrator, ReasoningBackend};
use crate::pipeline::{ActionSource, DecisionOutcome, DecisionPipeline, FallbackReason, UnitContext};
use crate::strategy::Archetype;
use crate::tactics::{estimate_unit_threat, TacticalAnalyzer};
use crate::tools::{BattlefieldQuery, ThreatScore, ToolAccess, ToolOperation};

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

pub struct Coordinator<T: ToolAccess + 'static> {
    config: EngineConfig,
    tools: Arc<T>,
    analyzer: Arc<TacticalAnalyzer>,
    roster: Arc<ControllerRoster>,
    pipeline: DecisionPipeline,
    analyst: Mutex<AgentProfile>,
    agents: Mutex<BTreeMap<UnitId, AgentProfile>>,
    narrator: Option<Narrator>,
    stats: Mutex<TurnStats>,
    last_plan: Mutex<Option<BattlePlan>>,
}

impl<T: ToolAccess + 'static> Coordinator<T> {
    pub fn new(config: EngineConfig, tools: Arc<T>) -> Result<Self> {
        config.validate()?;
        let analyzer = Arc::new(TacticalAnalyzer::new(config.analyzer.clone(), config.damage.clone()));
        let defaults = ControllerSettings {
            archetype: config.coordinator.default_archetype,
            skill: config.coordinator.default_skill,
            max_write_failures: config.coordinator.max_write_failures,
            seed: config.coordinator.seed,
            awareness_radius: config.analyzer.awareness_radius,
        };
        let query: Arc<dyn BattlefieldQuery> = tools.clone();
        let roster = Arc::new(ControllerRoster::new(query, analyzer.clone(), defaults));
        let pipeline = DecisionPipeline::new(
            config.pipeline.clone(),
            config.analyzer.awareness_radius,
            analyzer.damage_model().clone(),
            roster.clone(),
        );
        Ok(Self {
            config,
            tools,
            analyzer,
            roster,
            pipeline,
            analyst: Mutex::new(AgentProfile::analyst()),
            agents: Mutex::new(BTreeMap::new()),
            narrator: None,
            stats: Mutex::new(TurnStats::default()),
            last_plan: Mutex::new(None),
        })
    }

    /// Attach a reasoning backend for post-turn rationale
    pub fn with_reasoning(mut self, backend: Arc<dyn ReasoningBackend>) -> Self {
        let timeout = Duration::from_millis(self.config.coordinator.narration_timeout_ms);
        self.narrator = Some(Narrator::new(backend, timeout));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &DecisionPipeline {
        &self.pipeline
    }

    pub fn configure_unit(&self, unit: UnitId, archetype: Archetype, skill: SkillLevel) {
        self.roster.configure(unit, archetype, skill);
        self.ensure_agent(unit);
    }

    pub fn set_permissions(&self, unit: UnitId, permissions: impl IntoIterator<Item = ToolOperation>) {
        let mut agents = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        let agent = agents
            .remove(&unit)
            .unwrap_or_else(|| AgentProfile::unit_agent(unit))
            .with_permissions(permissions);
        agents.insert(unit, agent);
    }

    fn ensure_agent(&self, unit: UnitId) {
        self.agents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(unit)
            .or_insert_with(|| AgentProfile::unit_agent(unit));
    }

    pub fn last_plan(&self) -> Option<BattlePlan> {
        self.last_plan.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn narration(&self, unit: UnitId) -> Option<String> {
        self.narrator.as_ref().and_then(|n| n.narration(unit))
    }

    /// Status of a unit's controller and agent; pure read
    pub fn get_agent_status(&self, unit: UnitId) -> Option<AgentStatus> {
        let status = self.roster.status(unit)?;
        let agents = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        let agent = agents.get(&unit);
        Some(AgentStatus {
            unit,
            archetype: status.archetype,
            skill_level: status.skill_level,
            decisions_made: status.decisions_made,
            success_rate: status.success_rate,
            state: status.state,
            aggression: status.traits.aggression,
            risk_tolerance: status.traits.risk_tolerance,
            planning_horizon: status.traits.planning_horizon,
            permissions: agent.map(|a| a.permissions().collect()).unwrap_or_default(),
            stats: agent.map(|a| a.stats).unwrap_or_default(),
        })
    }

    pub fn get_performance_report(&self) -> PerformanceReport {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .report(self.pipeline.metrics())
    }

    /// Run one coordination pass for `controlled`
    ///
    /// Duplicate ids are decided once. The result always holds one entry per
    /// distinct requested unit.
    pub async fn execute_turn(&self, controlled: &[UnitId]) -> TurnResult {
        let pass_id = Uuid::new_v4();
        let span = info_span!("coordination_pass", %pass_id);
        self.run_pass(pass_id, controlled).instrument(span).await
    }

    async fn run_pass(&self, pass_id: Uuid, controlled: &[UnitId]) -> TurnResult {
        let started = Instant::now();
        let cfg = &self.config.coordinator;
        let pass_deadline = started + cfg.turn_budget();
        let mut warnings = Vec::new();
        let mut phases = PhaseTimings::default();

        let mut seen = AHashSet::new();
        let units: Vec<UnitId> = controlled.iter().copied().filter(|u| seen.insert(*u)).collect();
        for &unit in &units {
            self.ensure_agent(unit);
            self.roster.begin_turn(unit);
        }

        // Analyze
        let phase = Instant::now();
        let analysis = self
            .analyze(&units, cfg.phase_slice(cfg.analyze_share), &mut warnings)
            .await;
        phases.analyze_ms = millis(phase.elapsed());

        // Plan
        let phase = Instant::now();
        let plan = analysis.as_ref().map(|(snapshot, threats)| {
            let (mut plan, mut dropped) = BattlePlan::build(snapshot, &units, threats);
            dropped.extend(plan.validate(snapshot));
            for err in dropped {
                warn!(error = %err, "Assignment dropped, defaulting to attack-nearest");
                warnings.push(err.to_string());
            }
            plan
        });
        if plan.is_none() {
            warn!("No snapshot this pass, delegating with default assignments");
        }
        phases.plan_ms = millis(phase.elapsed());

        // Delegate
        let phase = Instant::now();
        let snapshot = analysis.map(|(snapshot, _)| snapshot);
        let contexts: Vec<UnitContext> = units
            .iter()
            .map(|&unit| UnitContext {
                unit,
                snapshot: snapshot.clone(),
                assignment: plan
                    .as_ref()
                    .map_or(Assignment::AttackNearest, |p| p.assignment_for(unit)),
            })
            .collect();
        let remaining = pass_deadline.saturating_duration_since(Instant::now());
        let outcomes = if remaining.is_zero() {
            warn!("Turn budget spent before delegation, using fallbacks");
            warnings.push("turn budget exhausted before delegation".into());
            self.fallback_all(&contexts)
        } else {
            let budget = cfg
                .phase_slice(cfg.delegate_share)
                .min(remaining)
                .min(self.config.pipeline.tier_timeouts.for_tier(cfg.delegate_priority));
            self.pipeline
                .decide_many(contexts.clone(), cfg.delegate_priority, Some(budget))
                .await
                .outcomes
        };
        {
            let mut agents = self.agents.lock().unwrap_or_else(|e| e.into_inner());
            for outcome in outcomes.values() {
                if let Some(agent) = agents.get_mut(&outcome.unit) {
                    agent.record_task(!outcome.is_fallback(), outcome.elapsed);
                }
            }
        }
        phases.delegate_ms = millis(phase.elapsed());

        // Finalize
        let phase = Instant::now();
        let mut resolved = deconflict(snapshot.as_deref(), &outcomes);
        let turn = snapshot.as_ref().map(|s| s.turn);
        let mut per_unit = BTreeMap::new();
        for ctx in &contexts {
            let Some((action, deconflicted)) = resolved.remove(&ctx.unit) else {
                continue;
            };
            let source = outcomes
                .get(&ctx.unit)
                .map(|o| o.source.clone())
                .unwrap_or(ActionSource::Fallback(FallbackReason::Timeout));
            let execution = self.execute_unit(ctx.unit, &action, &source, turn.unwrap_or_default(), &mut warnings);
            per_unit.insert(
                ctx.unit,
                UnitTurnResult {
                    action,
                    source,
                    assignment: ctx.assignment,
                    deconflicted,
                    execution,
                },
            );
        }
        phases.finalize_ms = millis(phase.elapsed());

        let decided = outcomes.values().filter(|o| !o.is_fallback()).count();
        let coordination_quality = if units.is_empty() {
            1.0
        } else {
            decided as f32 / units.len() as f32
        };
        let timing_ms = millis(started.elapsed());
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(timing_ms, coordination_quality);

        self.after_turn(turn, &per_unit);
        *self.last_plan.lock().unwrap_or_else(|e| e.into_inner()) = plan.clone();

        info!(
            turn = ?turn,
            units = units.len(),
            quality = coordination_quality,
            elapsed_ms = timing_ms,
            "Coordination pass complete"
        );

        TurnResult {
            pass_id,
            turn,
            success: per_unit.len() == units.len(),
            per_unit_actions: per_unit,
            timing_ms,
            phases,
            coordination_quality,
            plan,
            warnings,
        }
    }

    /// Snapshot plus one threat score per opposing unit
    ///
    /// `None` when the snapshot could not be read inside the slice. Threat
    /// reads that fail or miss the slice are replaced by a local estimate.
    async fn analyze(
        &self,
        units: &[UnitId],
        slice: Duration,
        warnings: &mut Vec<String>,
    ) -> Option<(Arc<BattlefieldSnapshot>, Vec<ThreatScore>)> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + slice;
        let (read_state, read_threat) = {
            let analyst = self.analyst.lock().unwrap_or_else(|e| e.into_inner());
            (
                analyst.permits(ToolOperation::ReadState),
                analyst.permits(ToolOperation::ReadThreat),
            )
        };
        if !read_state {
            warnings.push("analyst may not read battlefield state".into());
            self.record_analyst(false, started);
            return None;
        }

        let tools = self.tools.clone();
        let fetch = tokio::task::spawn_blocking(move || tools.battlefield_state());
        let snapshot = match tokio::time::timeout_at(deadline, fetch).await {
            Ok(Ok(Ok(snapshot))) => Arc::new(snapshot),
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "Battlefield state unavailable");
                warnings.push(format!("state unavailable: {err}"));
                self.record_analyst(false, started);
                return None;
            }
            Ok(Err(join)) => {
                warn!(error = %join, "State read task failed");
                warnings.push(format!("state read failed: {join}"));
                self.record_analyst(false, started);
                return None;
            }
            Err(_) => {
                warn!(slice_ms = millis(slice), "State read exceeded analyze slice");
                warnings.push("state read timed out".into());
                self.record_analyst(false, started);
                return None;
            }
        };

        let team = units
            .iter()
            .find_map(|id| snapshot.unit(*id).filter(|u| u.is_alive()).map(|u| u.team));
        let opponents: Vec<UnitId> = match team {
            Some(team) => snapshot.enemies_of(team).map(|u| u.id).collect(),
            None => Vec::new(),
        };

        let mut scored: AHashMap<UnitId, ThreatScore> = AHashMap::new();
        if read_threat && !opponents.is_empty() {
            let mut set = JoinSet::new();
            for &id in &opponents {
                let tools = self.tools.clone();
                set.spawn_blocking(move || tools.calculate_threat(id).map_err(|e| (id, e)));
            }
            loop {
                match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(Some(Ok(Ok(score)))) => {
                        scored.insert(score.unit, score);
                    }
                    Ok(Some(Ok(Err((id, err))))) => {
                        debug!(unit = %id, error = %err, "Threat read failed, estimating locally");
                    }
                    Ok(Some(Err(join))) => debug!(error = %join, "Threat task failed"),
                    Ok(None) => break,
                    Err(_) => {
                        warn!(abandoned = set.len(), "Threat reads abandoned at slice end");
                        set.abort_all();
                        break;
                    }
                }
            }
        }

        let damage = self.analyzer.damage_model();
        let threats = opponents
            .iter()
            .map(|id| {
                scored.remove(id).unwrap_or_else(|| ThreatScore {
                    unit: *id,
                    score: snapshot
                        .unit(*id)
                        .map_or(0.0, |u| estimate_unit_threat(u, &snapshot, damage)),
                })
            })
            .collect();
        self.record_analyst(true, started);
        Some((snapshot, threats))
    }

    fn record_analyst(&self, success: bool, started: Instant) {
        self.analyst
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_task(success, started.elapsed());
    }

    fn fallback_all(&self, contexts: &[UnitContext]) -> BTreeMap<UnitId, DecisionOutcome> {
        contexts
            .iter()
            .map(|ctx| {
                let outcome = DecisionOutcome {
                    unit: ctx.unit,
                    action: self.pipeline.fallback(ctx, "turn budget"),
                    source: ActionSource::Fallback(FallbackReason::Timeout),
                    elapsed: Duration::ZERO,
                };
                (ctx.unit, outcome)
            })
            .collect()
    }

    /// Issue the final action through the unit's controller
    fn execute_unit(
        &self,
        unit: UnitId,
        action: &CandidateAction,
        source: &ActionSource,
        turn: TurnNumber,
        warnings: &mut Vec<String>,
    ) -> Option<ExecutionReport> {
        let may_write = self
            .agents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&unit)
            .is_some_and(|a| a.permits(ToolOperation::QueueAction));
        if !may_write {
            debug!(unit = %unit, "Agent has no write permission, not executing");
            return None;
        }

        let handle = self.roster.controller(unit);
        let mut controller = match handle.try_lock() {
            Ok(controller) => controller,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // A timed-out computation still holds it; it stops at its next checkpoint
            Err(TryLockError::WouldBlock) => {
                warn!(unit = %unit, "Controller busy, skipping execution");
                warnings.push(format!("unit {unit}: controller busy"));
                return None;
            }
        };

        let pending = self.roster.take_pending(unit);
        let decision = match pending {
            Some(decision) if *source == ActionSource::Computed && controller.state() == ControllerState::Decided => {
                if decision.action() == action {
                    Ok(decision)
                } else {
                    controller.amend(&decision, action.clone())
                }
            }
            _ => controller.adopt(action, turn),
        };

        match decision.and_then(|d| controller.execute(self.tools.as_ref(), &d, &CancellationToken::new())) {
            Ok(report) => {
                if report.outcome == ExecutionOutcome::Exhausted {
                    warnings.push(format!("unit {unit}: write limit reached"));
                }
                Some(report)
            }
            Err(err) => {
                warn!(unit = %unit, error = %err, "Execution failed");
                warnings.push(format!("unit {unit}: {err}"));
                None
            }
        }
    }

    /// Background work that must not hold up the result
    fn after_turn(&self, turn: Option<TurnNumber>, results: &BTreeMap<UnitId, UnitTurnResult>) {
        let purged = self.pipeline.cache().purge_expired();
        if purged > 0 {
            debug!(purged, "Expired cache entries dropped");
        }
        if self.pipeline.pending_predictions() > 0 {
            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                let stored = pipeline.drain_predictions().await;
                debug!(stored, "Predictions precomputed");
            });
        }

        let Some(narrator) = self.narrator.as_ref().filter(|_| self.config.coordinator.narrate) else {
            return;
        };
        for (unit, result) in results {
            let executed = matches!(
                result.execution.as_ref().map(|r| &r.outcome),
                Some(ExecutionOutcome::Executed(_))
            );
            if executed {
                narrator.spawn(NarrationRequest {
                    unit: *unit,
                    turn: turn.unwrap_or_default(),
                    action: result.action.clone(),
                    assignment: result.assignment,
                });
            }
        }
    }
}

/// Resolve destination claims, highest confidence first
///
/// Returns each unit's final action and whether it was changed.
fn deconflict(
    snapshot: Option<&BattlefieldSnapshot>,
    outcomes: &BTreeMap<UnitId, DecisionOutcome>,
) -> BTreeMap<UnitId, (CandidateAction, bool)> {
    let mut order: Vec<&DecisionOutcome> = outcomes.values().collect();
    order.sort_by(|a, b| {
        b.action
            .confidence
            .value()
            .total_cmp(&a.action.confidence.value())
            .then_with(|| a.unit.cmp(&b.unit))
    });

    let mut claimed: AHashMap<Position, UnitId> = AHashMap::new();
    let mut resolved = BTreeMap::new();
    for outcome in order {
        let action = &outcome.action;
        let holder = action.destination().and_then(|d| claimed.get(&d).copied());
        let entry = match holder {
            None => {
                if let Some(dest) = action.destination() {
                    claimed.insert(dest, outcome.unit);
                }
                (action.clone(), false)
            }
            Some(holder) => {
                debug!(unit = %outcome.unit, holder = %holder, "Destination contested");
                (yield_destination(snapshot, outcome.unit, action, holder), true)
            }
        };
        resolved.insert(outcome.unit, entry);
    }
    resolved
}

/// Drop the contested move; keep the primary action only if still legal in place
fn yield_destination(
    snapshot: Option<&BattlefieldSnapshot>,
    unit: UnitId,
    action: &CandidateAction,
    holder: UnitId,
) -> CandidateAction {
    let note = format!("destination contested by {holder}");
    let stripped = action.without_move();
    let legal = !matches!(stripped.kind, ActionKind::Move | ActionKind::Wait)
        && snapshot
            .and_then(|s| s.unit(unit))
            .is_some_and(|me| stripped.is_legal_for(me));
    if legal {
        let rationale = format!("{}; {note}", stripped.rationale);
        stripped.with_rationale(rationale)
    } else {
        CandidateAction::wait(note).with_confidence(action.confidence.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::UnitView;
    use crate::core::types::{GridSize, TeamId};
    use crate::tools::LocalBattlefield;

    fn outcome(unit: u32, action: CandidateAction) -> (UnitId, DecisionOutcome) {
        (
            UnitId(unit),
            DecisionOutcome {
                unit: UnitId(unit),
                action,
                source: ActionSource::Computed,
                elapsed: Duration::ZERO,
            },
        )
    }

    fn snapshot() -> BattlefieldSnapshot {
        BattlefieldSnapshot::new(
            vec![
                UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0)),
                UnitView::new(UnitId(2), TeamId(0), Position::new(2, 0)),
                UnitView::new(UnitId(9), TeamId(1), Position::new(1, 2)),
            ],
            GridSize::new(6, 6),
            1,
        )
    }

    #[test]
    fn test_lower_confidence_loses_contested_move() {
        let snapshot = snapshot();
        let cell = Position::new(1, 1);
        let outcomes: BTreeMap<_, _> = [
            outcome(1, CandidateAction::move_to(cell).with_confidence(0.9)),
            outcome(2, CandidateAction::move_to(cell).with_confidence(0.4)),
        ]
        .into_iter()
        .collect();
        let resolved = deconflict(Some(&snapshot), &outcomes);
        assert_eq!(resolved[&UnitId(1)].0.destination(), Some(cell));
        assert!(!resolved[&UnitId(1)].1);
        assert!(resolved[&UnitId(2)].0.is_wait());
        assert!(resolved[&UnitId(2)].1);
    }

    #[test]
    fn test_loser_keeps_attack_still_in_range() {
        let snapshot = BattlefieldSnapshot::new(
            vec![
                UnitView::new(UnitId(1), TeamId(0), Position::new(0, 1)),
                UnitView::new(UnitId(2), TeamId(0), Position::new(1, 3)),
                UnitView::new(UnitId(9), TeamId(1), Position::new(1, 2)),
            ],
            GridSize::new(6, 6),
            1,
        );
        let cell = Position::new(1, 1);
        let enemy = Position::new(1, 2);
        let outcomes: BTreeMap<_, _> = [
            outcome(1, CandidateAction::move_to(cell).with_confidence(0.9)),
            outcome(
                2,
                CandidateAction::attack(UnitId(9), enemy)
                    .with_move(cell)
                    .with_confidence(0.5),
            ),
        ]
        .into_iter()
        .collect();
        let resolved = deconflict(Some(&snapshot), &outcomes);
        let (action, changed) = &resolved[&UnitId(2)];
        assert!(changed);
        assert_eq!(action.kind, ActionKind::Attack);
        assert_eq!(action.destination(), None);
    }

    #[test]
    fn test_distinct_destinations_untouched() {
        let outcomes: BTreeMap<_, _> = [
            outcome(1, CandidateAction::move_to(Position::new(1, 1))),
            outcome(2, CandidateAction::move_to(Position::new(3, 1))),
        ]
        .into_iter()
        .collect();
        let resolved = deconflict(None, &outcomes);
        assert!(resolved.values().all(|(_, changed)| !changed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_turn_without_snapshot_still_answers_every_unit() {
        let field = Arc::new(LocalBattlefield::new(snapshot()));
        field.set_fail_state(true);
        let mut config = EngineConfig::default();
        config.coordinator.turn_budget_ms = 2_000;
        let coordinator = Coordinator::new(config, field).unwrap();

        let result = coordinator.execute_turn(&[UnitId(1), UnitId(2), UnitId(1)]).await;
        assert!(result.success);
        assert_eq!(result.len(), 2);
        assert!(result.plan.is_none());
        assert!(result
            .per_unit_actions
            .values()
            .all(|r| r.assignment == Assignment::AttackNearest));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_only_agent_never_writes() {
        let field = Arc::new(LocalBattlefield::new(snapshot()));
        let mut config = EngineConfig::default();
        config.coordinator.turn_budget_ms = 2_000;
        let coordinator = Coordinator::new(config, field.clone()).unwrap();
        coordinator.set_permissions(UnitId(1), ToolOperation::READS);

        let result = coordinator.execute_turn(&[UnitId(1)]).await;
        assert!(result.per_unit_actions[&UnitId(1)].execution.is_none());
        assert_eq!(field.write_attempts(), 0);
    }
}
