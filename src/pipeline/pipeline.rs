//! Parallel decision pipeline
//!
//! Decisions are served from the fingerprint cache, then from the
//! precomputed table, and only then computed on a bounded worker pool under
//! a per-tier deadline. Whatever happens, every request gets an action: a
//! timeout or failure yields a low-confidence fallback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::battlefield::{BattlefieldSnapshot, CandidateAction};
use crate::controller::CancellationToken;
use crate::coordinator::Assignment;
use crate::core::config::PipelineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::UnitId;
use crate::pipeline::cache::DecisionCache;
use crate::pipeline::fingerprint::{ContextFingerprint, DecisionRecord};
use crate::pipeline::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::precompute::{predict_followups, PrecomputedTable, PredictionJob, PredictionQueue};
use crate::pipeline::priority::PriorityTier;
use crate::tactics::DamageModel;

/// Everything a decision computation needs for one unit
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub unit: UnitId,
    /// Shared snapshot; `None` makes the source read state itself
    pub snapshot: Option<Arc<BattlefieldSnapshot>>,
    pub assignment: Assignment,
}

impl UnitContext {
    pub fn new(unit: UnitId, snapshot: Arc<BattlefieldSnapshot>, assignment: Assignment) -> Self {
        Self {
            unit,
            snapshot: Some(snapshot),
            assignment,
        }
    }

    pub fn without_snapshot(unit: UnitId, assignment: Assignment) -> Self {
        Self {
            unit,
            snapshot: None,
            assignment,
        }
    }
}

/// Blocking decision computation plugged into the pipeline
///
/// Implementations must poll `cancel` often enough that an abandoned
/// computation stops promptly.
pub trait DecisionSource: Send + Sync + 'static {
    fn compute(&self, ctx: &UnitContext, cancel: &CancellationToken) -> Result<CandidateAction>;

    /// Side-effect-free computation for a hypothetical context
    fn predict(&self, ctx: &UnitContext) -> Result<CandidateAction> {
        self.compute(ctx, &CancellationToken::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Timeout,
    Failed(String),
}

/// Where an action came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Cached,
    Precomputed,
    Computed,
    Fallback(FallbackReason),
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSource::Cached => f.write_str("cached"),
            ActionSource::Precomputed => f.write_str("precomputed"),
            ActionSource::Computed => f.write_str("computed"),
            ActionSource::Fallback(FallbackReason::Timeout) => f.write_str("fallback(timeout)"),
            ActionSource::Fallback(FallbackReason::Failed(e)) => write!(f, "fallback({e})"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub unit: UnitId,
    pub action: CandidateAction,
    pub source: ActionSource,
    pub elapsed: Duration,
}

impl DecisionOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ActionSource::Fallback(_))
    }
}

/// Result of a parallel batch; holds exactly one entry per requested unit
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub outcomes: BTreeMap<UnitId, DecisionOutcome>,
    pub completed: usize,
    pub attempted: usize,
    /// `completed / attempted`, 1.0 for an empty batch
    pub efficiency: f32,
    pub elapsed: Duration,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn action(&self, unit: UnitId) -> Option<&CandidateAction> {
        self.outcomes.get(&unit).map(|o| &o.action)
    }

    pub fn into_actions(self) -> BTreeMap<UnitId, CandidateAction> {
        self.outcomes
            .into_iter()
            .map(|(unit, outcome)| (unit, outcome.action))
            .collect()
    }
}

struct PipelineInner {
    config: PipelineConfig,
    awareness_radius: u32,
    damage: DamageModel,
    source: Arc<dyn DecisionSource>,
    cache: DecisionCache,
    precomputed: PrecomputedTable,
    predictions: PredictionQueue,
    workers: Arc<Semaphore>,
    metrics: PipelineMetrics,
}

/// Cheap to clone; clones share the pool, cache and metrics
#[derive(Clone)]
pub struct DecisionPipeline {
    inner: Arc<PipelineInner>,
}

impl fmt::Debug for DecisionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionPipeline")
            .field("workers", &self.inner.config.workers)
            .field("cached", &self.inner.cache.len())
            .field("precomputed", &self.inner.precomputed.len())
            .finish()
    }
}

impl DecisionPipeline {
    pub fn new(
        config: PipelineConfig,
        awareness_radius: u32,
        damage: DamageModel,
        source: Arc<dyn DecisionSource>,
    ) -> Self {
        let ttl = config.cache_ttl();
        Self {
            inner: Arc::new(PipelineInner {
                cache: DecisionCache::new(config.cache_capacity, ttl),
                precomputed: PrecomputedTable::new(config.precompute_capacity, ttl),
                predictions: PredictionQueue::new(config.prediction_queue_capacity),
                workers: Arc::new(Semaphore::new(config.workers.max(1))),
                metrics: PipelineMetrics::default(),
                config,
                awareness_radius,
                damage,
                source,
            }),
        }
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.inner.cache
    }

    pub fn precomputed(&self) -> &PrecomputedTable {
        &self.inner.precomputed
    }

    pub fn pending_predictions(&self) -> usize {
        self.inner.predictions.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    fn fingerprint(&self, ctx: &UnitContext) -> Option<ContextFingerprint> {
        ctx.snapshot
            .as_deref()
            .and_then(|s| ContextFingerprint::compute(s, ctx.unit, self.inner.awareness_radius))
    }

    /// Decide for one unit; never fails
    ///
    /// `timeout` overrides the tier's default budget.
    pub async fn decide(&self, ctx: UnitContext, priority: PriorityTier, timeout: Option<Duration>) -> DecisionOutcome {
        let started = Instant::now();
        let budget = timeout.unwrap_or_else(|| self.inner.config.tier_timeouts.for_tier(priority));
        let fingerprint = self.fingerprint(&ctx);

        if let Some(fp) = fingerprint {
            let cached = self
                .inner
                .cache
                .get(&fp)
                .filter(|record| still_applies(&record.action, &ctx));
            if let Some(record) = cached {
                self.inner.metrics.record_cache_hit();
                return self.finish(ctx.unit, record.action, ActionSource::Cached, started);
            }
            self.inner.metrics.record_cache_miss();
            let precomputed = self
                .inner
                .precomputed
                .get(&fp)
                .filter(|action| still_applies(action, &ctx));
            if let Some(action) = precomputed {
                self.inner.metrics.record_precomputed_hit();
                self.inner.cache.insert(
                    fp,
                    DecisionRecord::new(ctx.unit, action.clone(), Some(fp), turn_of(&ctx)),
                );
                return self.finish(ctx.unit, action, ActionSource::Precomputed, started);
            }
        }

        let deadline = tokio::time::Instant::now() + budget;
        match self.compute_until(ctx.clone(), deadline, budget).await {
            Ok(action) => {
                if let Some(fp) = fingerprint {
                    self.inner.cache.insert(
                        fp,
                        DecisionRecord::new(ctx.unit, action.clone(), Some(fp), turn_of(&ctx)),
                    );
                    self.schedule_predictions(&ctx);
                }
                self.finish(ctx.unit, action, ActionSource::Computed, started)
            }
            Err(EngineError::Timeout { budget_ms }) => {
                self.inner.metrics.record_timeout();
                warn!(unit = %ctx.unit, budget_ms, tier = %priority, "decision timed out, using fallback");
                let action = self.fallback(&ctx, "timeout");
                self.finish(ctx.unit, action, ActionSource::Fallback(FallbackReason::Timeout), started)
            }
            Err(err) => {
                self.inner.metrics.record_failure();
                warn!(unit = %ctx.unit, error = %err, "decision failed, using fallback");
                let action = self.fallback(&ctx, "computation failed");
                self.finish(
                    ctx.unit,
                    action,
                    ActionSource::Fallback(FallbackReason::Failed(err.to_string())),
                    started,
                )
            }
        }
    }

    fn finish(&self, unit: UnitId, action: CandidateAction, source: ActionSource, started: Instant) -> DecisionOutcome {
        let elapsed = started.elapsed();
        self.inner.metrics.record_decision(elapsed);
        debug!(unit = %unit, source = %source, action = %action.kind, elapsed_ms = elapsed.as_millis() as u64, "decision served");
        DecisionOutcome {
            unit,
            action,
            source,
            elapsed,
        }
    }

    /// Run the source on the worker pool, abandoning it at `deadline`
    async fn compute_until(
        &self,
        ctx: UnitContext,
        deadline: tokio::time::Instant,
        budget: Duration,
    ) -> Result<CandidateAction> {
        let timed_out = || EngineError::Timeout {
            budget_ms: budget.as_millis() as u64,
        };
        let permit = tokio::time::timeout_at(deadline, self.inner.workers.clone().acquire_owned())
            .await
            .map_err(|_| timed_out())?
            .map_err(|_| EngineError::Worker("worker pool closed".into()))?;

        let cancel = CancellationToken::new();
        // Cancels the worker if this future is dropped or times out
        let _guard = cancel.clone().drop_guard();
        let source = self.inner.source.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            source.compute(&ctx, &cancel)
        });

        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(EngineError::Worker(join.to_string())),
            Err(_) => Err(timed_out()),
        }
    }

    /// Decide for many units in parallel under one shared deadline
    ///
    /// Returns exactly one outcome per distinct unit in `contexts`. Work still
    /// running when the deadline passes is aborted and its unit gets the
    /// fallback.
    pub async fn decide_many(
        &self,
        contexts: Vec<UnitContext>,
        priority: PriorityTier,
        timeout: Option<Duration>,
    ) -> BatchOutcome {
        let started = Instant::now();
        let budget = timeout.unwrap_or_else(|| self.inner.config.tier_timeouts.for_tier(priority));
        let deadline = tokio::time::Instant::now() + budget;

        let mut pending: BTreeMap<UnitId, UnitContext> = BTreeMap::new();
        for ctx in contexts {
            pending.insert(ctx.unit, ctx);
        }
        let attempted = pending.len();

        let mut set = JoinSet::new();
        for ctx in pending.values().cloned() {
            let pipeline = self.clone();
            set.spawn(async move { pipeline.decide(ctx, priority, Some(budget)).await });
        }

        let mut outcomes = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(outcome))) => {
                    pending.remove(&outcome.unit);
                    outcomes.insert(outcome.unit, outcome);
                }
                Ok(Some(Err(join))) => warn!(error = %join, "decision task failed"),
                Ok(None) => break,
                Err(_) => {
                    set.abort_all();
                    break;
                }
            }
        }

        for (unit, ctx) in pending {
            self.inner.metrics.record_timeout();
            let action = self.fallback(&ctx, "batch deadline");
            let outcome = self.finish(unit, action, ActionSource::Fallback(FallbackReason::Timeout), started);
            outcomes.insert(unit, outcome);
        }

        let completed = outcomes.values().filter(|o| !o.is_fallback()).count();
        self.inner.metrics.record_batch(completed, attempted);
        BatchOutcome {
            completed,
            attempted,
            efficiency: if attempted == 0 {
                1.0
            } else {
                completed as f32 / attempted as f32
            },
            elapsed: started.elapsed(),
            outcomes,
        }
    }

    /// Low-confidence action used when no real decision is available
    ///
    /// Attacks the nearest living enemy already in attack range, else waits.
    pub fn fallback(&self, ctx: &UnitContext, reason: &str) -> CandidateAction {
        let confidence = self.inner.config.fallback_confidence;
        let target = ctx.snapshot.as_deref().and_then(|s| {
            let unit = s.unit(ctx.unit).filter(|u| u.is_alive())?;
            s.enemies_of(unit.team)
                .filter(|e| e.position.distance(&unit.position) <= unit.attributes.attack_range)
                .min_by_key(|e| (e.position.distance(&unit.position), e.id))
                .map(|e| (e.id, e.position))
        });
        match target {
            Some((id, at)) => CandidateAction::attack(id, at)
                .with_confidence(confidence)
                .with_rationale(format!("fallback ({reason}): attack nearest {id}")),
            None => CandidateAction::wait(format!("fallback ({reason}): wait")).with_confidence(confidence),
        }
    }

    fn schedule_predictions(&self, ctx: &UnitContext) {
        let max = self.inner.config.max_predictions_per_decision;
        for predicted in predict_followups(ctx, &self.inner.damage, max) {
            let Some(fp) = self.fingerprint(&predicted) else {
                continue;
            };
            if self.inner.cache.contains(&fp) || self.inner.precomputed.contains(&fp) {
                continue;
            }
            let job = PredictionJob {
                fingerprint: fp,
                context: predicted,
            };
            if !self.inner.predictions.push(job) {
                self.inner.metrics.record_prediction_dropped();
            }
        }
    }

    /// Work through queued predictions using only idle worker capacity
    ///
    /// Stops as soon as no permit is free, so live decisions are never made
    /// to wait on predictions that have not started. Returns how many
    /// predictions were stored.
    pub async fn drain_predictions(&self) -> usize {
        let mut running = JoinSet::new();
        loop {
            let Ok(permit) = self.inner.workers.clone().try_acquire_owned() else {
                break;
            };
            let Some(job) = self.inner.predictions.pop() else {
                break;
            };
            let inner = self.inner.clone();
            running.spawn_blocking(move || {
                let _permit = permit;
                match inner.source.predict(&job.context) {
                    Ok(action) => {
                        inner.precomputed.insert(job.fingerprint, action);
                        inner.metrics.record_prediction();
                        true
                    }
                    Err(err) => {
                        debug!(unit = %job.context.unit, error = %err, "prediction discarded");
                        false
                    }
                }
            });
        }

        let mut stored = 0;
        while let Some(result) = running.join_next().await {
            if matches!(result, Ok(true)) {
                stored += 1;
            }
        }
        stored
    }
}

/// Whether a stored action still fits the context's snapshot
///
/// Fingerprints ignore positions, so a stored move may now point at an
/// occupied cell or out of range, and a stored attack at a unit that has
/// moved or is no longer in reach.
fn still_applies(action: &CandidateAction, ctx: &UnitContext) -> bool {
    let Some(snapshot) = ctx.snapshot.as_deref() else {
        return false;
    };
    let Some(me) = snapshot.unit(ctx.unit) else {
        return false;
    };
    if !action.is_legal_for(me) {
        return false;
    }
    let destination_ok = action
        .destination()
        .map_or(true, |d| snapshot.is_free(d) || snapshot.occupant(d).is_some_and(|u| u.id == ctx.unit));
    let target_ok = match (action.target_unit, action.targets.first()) {
        (Some(id), Some(at)) => snapshot
            .unit(id)
            .is_some_and(|t| t.is_alive() && t.position == *at),
        _ => true,
    };
    destination_ok && target_ok
}

fn turn_of(ctx: &UnitContext) -> u32 {
    ctx.snapshot.as_deref().map(|s| s.turn).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::UnitView;
    use crate::controller::CancelCheck;
    use crate::core::types::{GridSize, Position, TeamId};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Attacks the first enemy in range, else waits; optionally slow
    struct StubSource {
        calls: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self { delay, ..Self::new() }
        }
    }

    impl DecisionSource for StubSource {
        fn compute(&self, ctx: &UnitContext, cancel: &CancellationToken) -> Result<CandidateAction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = Duration::from_millis(5);
            let mut waited = Duration::ZERO;
            while waited < self.delay {
                cancel.check()?;
                std::thread::sleep(step);
                waited += step;
            }
            if self.fail {
                return Err(EngineError::DataUnavailable("stub".into()));
            }
            Ok(CandidateAction::wait(format!("computed for {}", ctx.unit)).with_confidence(0.9))
        }
    }

    fn snapshot() -> Arc<BattlefieldSnapshot> {
        Arc::new(BattlefieldSnapshot::new(
            vec![
                UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0)),
                UnitView::new(UnitId(2), TeamId(0), Position::new(5, 5)),
                UnitView::new(UnitId(10), TeamId(1), Position::new(0, 1)),
            ],
            GridSize::new(8, 8),
            1,
        ))
    }

    fn pipeline(source: Arc<StubSource>) -> DecisionPipeline {
        DecisionPipeline::new(PipelineConfig::default(), 5, DamageModel::default(), source)
    }

    #[tokio::test]
    async fn test_second_identical_request_hits_cache() {
        let source = Arc::new(StubSource::new());
        let pipeline = pipeline(source.clone());
        let ctx = UnitContext::new(UnitId(1), snapshot(), Assignment::AttackNearest);

        let first = pipeline.decide(ctx.clone(), PriorityTier::Normal, None).await;
        let second = pipeline.decide(ctx, PriorityTier::Normal, None).await;

        assert_eq!(first.source, ActionSource::Computed);
        assert_eq!(second.source, ActionSource::Cached);
        assert_eq!(second.action, first.action);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let metrics = pipeline.metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_stale_cached_attack_is_recomputed() {
        let source = Arc::new(StubSource::new());
        let pipeline = pipeline(source.clone());
        let snap = snapshot();
        let ctx = UnitContext::new(UnitId(1), snap.clone(), Assignment::AttackNearest);
        let fp = ContextFingerprint::compute(&snap, UnitId(1), 5).unwrap();
        pipeline.cache().insert(
            fp,
            DecisionRecord::new(
                UnitId(1),
                CandidateAction::attack(UnitId(10), Position::new(1, 0)),
                Some(fp),
                1,
            ),
        );
        let outcome = pipeline.decide(ctx, PriorityTier::Normal, None).await;
        assert_eq!(outcome.source, ActionSource::Computed);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_action_out_of_reach_is_recomputed() {
        // Unit 1 has walked away from enemy 10; enemy 11 keeps the ring counts alike
        let moved = Arc::new(BattlefieldSnapshot::new(
            vec![
                UnitView::new(UnitId(1), TeamId(0), Position::new(5, 4)),
                UnitView::new(UnitId(10), TeamId(1), Position::new(0, 1)),
                UnitView::new(UnitId(11), TeamId(1), Position::new(5, 5)),
            ],
            GridSize::new(8, 8),
            2,
        ));
        let fp = ContextFingerprint::compute(&moved, UnitId(1), 5).unwrap();
        let stale = [
            CandidateAction::attack(UnitId(10), Position::new(0, 1)),
            CandidateAction::move_to(Position::new(1, 4)),
        ];

        for action in stale {
            let source = Arc::new(StubSource::new());
            let pipeline = pipeline(source.clone());
            pipeline
                .cache()
                .insert(fp, DecisionRecord::new(UnitId(1), action, Some(fp), 1));
            let ctx = UnitContext::new(UnitId(1), moved.clone(), Assignment::AttackNearest);
            let outcome = pipeline.decide(ctx, PriorityTier::Normal, None).await;
            assert_eq!(outcome.source, ActionSource::Computed);
            assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        }

        // Still in reach from the current cell, so it is served
        let source = Arc::new(StubSource::new());
        let pipeline = pipeline(source.clone());
        let fresh = CandidateAction::attack(UnitId(11), Position::new(5, 5));
        pipeline
            .cache()
            .insert(fp, DecisionRecord::new(UnitId(1), fresh.clone(), Some(fp), 1));
        let ctx = UnitContext::new(UnitId(1), moved, Assignment::AttackNearest);
        let outcome = pipeline.decide(ctx, PriorityTier::Normal, None).await;
        assert_eq!(outcome.source, ActionSource::Cached);
        assert_eq!(outcome.action, fresh);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_yields_fallback_attack() {
        let source = Arc::new(StubSource::slow(Duration::from_millis(500)));
        let pipeline = pipeline(source);
        let ctx = UnitContext::new(UnitId(1), snapshot(), Assignment::AttackNearest);

        let outcome = pipeline
            .decide(ctx, PriorityTier::Critical, Some(Duration::from_millis(20)))
            .await;

        assert_eq!(outcome.source, ActionSource::Fallback(FallbackReason::Timeout));
        assert_eq!(outcome.action.target_unit, Some(UnitId(10)));
        assert!((outcome.action.confidence.value() - 0.3).abs() < 1e-6);
        assert_eq!(pipeline.metrics().timeouts, 1);
    }

    #[tokio::test]
    async fn test_fallback_waits_without_target_in_range() {
        let pipeline = pipeline(Arc::new(StubSource::new()));
        let ctx = UnitContext::new(UnitId(2), snapshot(), Assignment::AttackNearest);
        let action = pipeline.fallback(&ctx, "test");
        assert!(action.is_wait());
        assert!((action.confidence.value() - 0.3).abs() < 1e-6);

        let blind = UnitContext::without_snapshot(UnitId(2), Assignment::AttackNearest);
        assert!(pipeline.fallback(&blind, "test").is_wait());
    }

    #[tokio::test]
    async fn test_failure_yields_fallback() {
        let source = Arc::new(StubSource {
            fail: true,
            ..StubSource::new()
        });
        let pipeline = pipeline(source);
        let ctx = UnitContext::new(UnitId(1), snapshot(), Assignment::AttackNearest);
        let outcome = pipeline.decide(ctx, PriorityTier::Normal, None).await;
        assert!(matches!(outcome.source, ActionSource::Fallback(FallbackReason::Failed(_))));
        assert!(pipeline.cache().is_empty());
    }

    #[tokio::test]
    async fn test_without_snapshot_skips_cache() {
        let source = Arc::new(StubSource::new());
        let pipeline = pipeline(source.clone());
        for _ in 0..2 {
            let ctx = UnitContext::without_snapshot(UnitId(1), Assignment::AttackNearest);
            let outcome = pipeline.decide(ctx, PriorityTier::Normal, None).await;
            assert_eq!(outcome.source, ActionSource::Computed);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.metrics().cache_misses, 0);
    }

    #[tokio::test]
    async fn test_batch_returns_entry_per_unit() {
        let pipeline = pipeline(Arc::new(StubSource::new()));
        let snap = snapshot();
        let contexts = vec![
            UnitContext::new(UnitId(1), snap.clone(), Assignment::AttackNearest),
            UnitContext::new(UnitId(2), snap.clone(), Assignment::SupportAllies),
        ];
        let batch = pipeline.decide_many(contexts, PriorityTier::Normal, None).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.completed, 2);
        assert_eq!(batch.efficiency, 1.0);
        assert!(batch.action(UnitId(2)).is_some());
    }

    #[tokio::test]
    async fn test_batch_deadline_fills_with_fallbacks() {
        let pipeline = pipeline(Arc::new(StubSource::slow(Duration::from_millis(400))));
        let snap = snapshot();
        let contexts = vec![
            UnitContext::new(UnitId(1), snap.clone(), Assignment::AttackNearest),
            UnitContext::new(UnitId(2), snap, Assignment::AttackNearest),
        ];
        let batch = pipeline
            .decide_many(contexts, PriorityTier::Critical, Some(Duration::from_millis(30)))
            .await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.completed, 0);
        assert_eq!(batch.efficiency, 0.0);
        assert!(batch.outcomes.values().all(|o| o.is_fallback()));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pipeline = pipeline(Arc::new(StubSource::new()));
        let batch = pipeline.decide_many(Vec::new(), PriorityTier::Low, None).await;
        assert!(batch.is_empty());
        assert_eq!(batch.efficiency, 1.0);
    }

    #[tokio::test]
    async fn test_predictions_fill_precomputed_table() {
        let source = Arc::new(StubSource::new());
        let pipeline = pipeline(source);
        let ctx = UnitContext::new(UnitId(1), snapshot(), Assignment::AttackNearest);
        pipeline.decide(ctx.clone(), PriorityTier::Normal, None).await;
        assert!(pipeline.pending_predictions() > 0);

        let stored = pipeline.drain_predictions().await;
        assert!(stored > 0);
        assert_eq!(pipeline.pending_predictions(), 0);

        // The unit after spending one action point is now precomputed
        let snap = ctx.snapshot.as_deref().unwrap();
        let mut spent = snap.unit(UnitId(1)).unwrap().clone();
        spent.action_points -= 1;
        let next = UnitContext::new(UnitId(1), Arc::new(snap.with_unit(spent)), Assignment::AttackNearest);
        let outcome = pipeline.decide(next, PriorityTier::Normal, None).await;
        assert_eq!(outcome.source, ActionSource::Precomputed);
    }
}
