//! Predictive precomputation
//!
//! After a successful computation the pipeline guesses a few likely
//! follow-up states for the same unit and queues them. Idle worker capacity
//! drains the queue and stores the answers here, keyed by fingerprint.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ahash::AHashMap;

use crate::battlefield::{BattlefieldSnapshot, CandidateAction};
use crate::pipeline::fingerprint::ContextFingerprint;
use crate::pipeline::pipeline::UnitContext;
use crate::tactics::DamageModel;

/// Answers computed ahead of time
#[derive(Debug)]
pub struct PrecomputedTable {
    entries: Mutex<AHashMap<ContextFingerprint, (CandidateAction, Instant)>>,
    capacity: usize,
    ttl: Duration,
}

impl PrecomputedTable {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &ContextFingerprint) -> Option<CandidateAction> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((action, at)) if at.elapsed() < self.ttl => Some(action.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: ContextFingerprint, action: CandidateAction) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries.iter().min_by_key(|(_, (_, at))| *at).map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, (action, Instant::now()));
    }

    pub fn contains(&self, key: &ContextFingerprint) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A predicted context waiting for idle capacity
#[derive(Debug, Clone)]
pub struct PredictionJob {
    pub fingerprint: ContextFingerprint,
    pub context: UnitContext,
}

/// Bounded FIFO of prediction jobs; pushes beyond capacity are dropped
#[derive(Debug)]
pub struct PredictionQueue {
    jobs: Mutex<VecDeque<PredictionJob>>,
    capacity: usize,
}

impl PredictionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// `false` when the queue is full or already holds the fingerprint
    pub fn push(&self, job: PredictionJob) -> bool {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.len() >= self.capacity || jobs.iter().any(|j| j.fingerprint == job.fingerprint) {
            return false;
        }
        jobs.push_back(job);
        true
    }

    pub fn pop(&self) -> Option<PredictionJob> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Likely next states of `ctx.unit`, at most `max` of them
///
/// In order: the unit after spending one action point, the unit after taking
/// a hit from the strongest enemy in reach, and the field with the weakest
/// enemy in attack range removed.
pub fn predict_followups(ctx: &UnitContext, damage: &DamageModel, max: usize) -> Vec<UnitContext> {
    let Some(snapshot) = ctx.snapshot.as_deref() else {
        return Vec::new();
    };
    let Some(unit) = snapshot.unit(ctx.unit).filter(|u| u.is_alive()) else {
        return Vec::new();
    };
    let mut predicted: Vec<BattlefieldSnapshot> = Vec::with_capacity(3);

    if unit.action_points > 0 {
        let mut spent = unit.clone();
        spent.action_points -= 1;
        predicted.push(snapshot.with_unit(spent));
    }

    let heaviest_hit = snapshot
        .enemies_of(unit.team)
        .filter(|e| e.position.distance(&unit.position) <= e.reach())
        .map(|e| damage.attack_damage(e, unit).round() as u32)
        .max();
    if let Some(hit) = heaviest_hit.filter(|h| *h > 0) {
        let mut wounded = unit.clone();
        wounded.hp = wounded.hp.saturating_sub(hit).max(1);
        predicted.push(snapshot.with_unit(wounded));
    }

    let weakest = snapshot
        .enemies_of(unit.team)
        .filter(|e| e.position.distance(&unit.position) <= unit.attributes.attack_range)
        .min_by_key(|e| (e.hp, e.id));
    if let Some(weakest) = weakest {
        predicted.push(snapshot.without_unit(weakest.id));
    }

    predicted
        .into_iter()
        .take(max)
        .map(|s| UnitContext {
            unit: ctx.unit,
            snapshot: Some(Arc::new(s)),
            assignment: ctx.assignment,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::UnitView;
    use crate::coordinator::Assignment;
    use crate::core::types::{GridSize, Position, TeamId, UnitId};

    fn fp(hp: u32) -> ContextFingerprint {
        ContextFingerprint {
            unit: UnitId(1),
            hp,
            mp: 0,
            action_points: 2,
            enemies_in_attack_range: 1,
            enemies_in_reach: 1,
            enemies_aware: 1,
        }
    }

    fn context() -> UnitContext {
        let snapshot = BattlefieldSnapshot::new(
            vec![
                UnitView::new(UnitId(1), TeamId(0), Position::new(2, 2)),
                UnitView::new(UnitId(2), TeamId(1), Position::new(2, 3)).with_hp(10, 50),
                UnitView::new(UnitId(3), TeamId(1), Position::new(3, 2)),
            ],
            GridSize::new(8, 8),
            1,
        );
        UnitContext::new(UnitId(1), Arc::new(snapshot), Assignment::AttackNearest)
    }

    #[test]
    fn test_followups_cover_three_variants() {
        let ctx = context();
        let followups = predict_followups(&ctx, &DamageModel::default(), 3);
        assert_eq!(followups.len(), 3);

        let spent = followups[0].snapshot.as_deref().unwrap().unit(UnitId(1)).unwrap();
        assert_eq!(spent.action_points, 1);
        let wounded = followups[1].snapshot.as_deref().unwrap().unit(UnitId(1)).unwrap();
        assert!(wounded.hp < 50);
        assert!(!followups[2].snapshot.as_deref().unwrap().contains(UnitId(2)));
        assert!(followups.iter().all(|f| f.unit == UnitId(1)));
    }

    #[test]
    fn test_followups_respect_limit() {
        assert_eq!(predict_followups(&context(), &DamageModel::default(), 1).len(), 1);
    }

    #[test]
    fn test_no_snapshot_no_predictions() {
        let ctx = UnitContext::without_snapshot(UnitId(1), Assignment::AttackNearest);
        assert!(predict_followups(&ctx, &DamageModel::default(), 3).is_empty());
    }

    #[test]
    fn test_queue_drops_when_full_or_duplicate() {
        let queue = PredictionQueue::new(2);
        let job = |hp| PredictionJob {
            fingerprint: fp(hp),
            context: context(),
        };
        assert!(queue.push(job(10)));
        assert!(!queue.push(job(10)));
        assert!(queue.push(job(20)));
        assert!(!queue.push(job(30)));
        assert_eq!(queue.pop().map(|j| j.fingerprint.hp), Some(10));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_table_evicts_oldest_and_expires() {
        let table = PrecomputedTable::new(1, Duration::from_secs(60));
        table.insert(fp(1), CandidateAction::wait("a"));
        table.insert(fp(2), CandidateAction::wait("b"));
        assert!(!table.contains(&fp(1)));
        assert!(table.contains(&fp(2)));

        let stale = PrecomputedTable::new(4, Duration::from_millis(0));
        stale.insert(fp(1), CandidateAction::wait("a"));
        assert!(stale.get(&fp(1)).is_none());
        assert!(stale.is_empty());
    }
}
