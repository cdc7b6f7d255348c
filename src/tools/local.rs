//! In-process Tool Access Layer adapter
//!
//! Holds an authoritative copy of the battlefield and implements both tool
//! interfaces over it. Faults can be injected per call category so that the
//! degradation paths of the engine can be exercised deterministically.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use ahash::AHashMap;
use serde::Serialize;

use crate::battlefield::{ActionKind, BattlefieldSnapshot};
use crate::core::config::DamageConfig;
use crate::core::types::{Position, UnitId};
use crate::tactics::{estimate_unit_threat, DamageModel};
use crate::tools::{
    Ability, AbilityEffect, BattlefieldQuery, ThreatScore, ToolError, UnitCommands, UnitDetail,
};

/// Action accepted by the adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedAction {
    pub kind: ActionKind,
    pub targets: Vec<Position>,
    pub priority: u8,
}

/// Summary of one `advance_turn` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnResolution {
    pub moves_applied: u32,
    pub attacks_applied: u32,
    pub units_defeated: u32,
}

#[derive(Debug, Default)]
struct FaultInjection {
    fail_state: AtomicBool,
    fail_detail: AtomicBool,
    fail_threat: AtomicBool,
    /// Writes still to reject; `u32::MAX` rejects forever
    reject_writes: AtomicU32,
    latency_ms: AtomicU64,
}

pub struct LocalBattlefield {
    state: RwLock<BattlefieldSnapshot>,
    abilities: RwLock<AHashMap<UnitId, Vec<Ability>>>,
    queues: Mutex<AHashMap<UnitId, Vec<QueuedAction>>>,
    faults: FaultInjection,
    write_attempts: AtomicU64,
    damage: DamageModel,
}

impl LocalBattlefield {
    pub fn new(snapshot: BattlefieldSnapshot) -> Self {
        Self::with_damage(snapshot, DamageConfig::default())
    }

    pub fn with_damage(snapshot: BattlefieldSnapshot, damage: DamageConfig) -> Self {
        Self {
            state: RwLock::new(snapshot),
            abilities: RwLock::new(AHashMap::new()),
            queues: Mutex::new(AHashMap::new()),
            faults: FaultInjection::default(),
            write_attempts: AtomicU64::new(0),
            damage: DamageModel::new(damage),
        }
    }

    pub fn grant_abilities(&self, unit: UnitId, abilities: Vec<Ability>) {
        self.abilities
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(unit, abilities);
    }

    /// Make `battlefield_state` fail until reset
    pub fn set_fail_state(&self, fail: bool) {
        self.faults.fail_state.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_detail(&self, fail: bool) {
        self.faults.fail_detail.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_threat(&self, fail: bool) {
        self.faults.fail_threat.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `count` queue requests
    pub fn reject_next_writes(&self, count: u32) {
        self.faults.reject_writes.store(count, Ordering::SeqCst);
    }

    pub fn reject_all_writes(&self) {
        self.faults.reject_writes.store(u32::MAX, Ordering::SeqCst);
    }

    /// Delay every read call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of queue requests received, accepted or not
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn queued_actions(&self, unit: UnitId) -> Vec<QueuedAction> {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&unit)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of the authoritative state, bypassing fault injection
    pub fn snapshot(&self) -> BattlefieldSnapshot {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn simulate_latency(&self) {
        let ms = self.faults.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    fn take_rejection(&self) -> bool {
        self.faults
            .reject_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    /// Apply every queued action in unit order and start the next turn
    pub fn advance_turn(&self) -> TurnResolution {
        let queues = std::mem::take(&mut *self.queues.lock().unwrap_or_else(|e| e.into_inner()));
        let abilities = self.abilities.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut resolution = TurnResolution::default();

        let mut order: Vec<_> = queues.keys().copied().collect();
        order.sort();

        for unit_id in order {
            for action in queues.get(&unit_id).into_iter().flatten() {
                let Some(actor) = state.unit(unit_id).filter(|u| u.is_alive()).cloned() else {
                    break;
                };
                let Some(&target) = action.targets.first() else {
                    continue;
                };
                match &action.kind {
                    ActionKind::Move => {
                        if state.is_free(target)
                            && actor.position.distance(&target) <= actor.attributes.move_range
                        {
                            let mut moved = actor.clone();
                            moved.position = target;
                            *state = state.with_unit(moved);
                            resolution.moves_applied += 1;
                        }
                    }
                    ActionKind::Attack => {
                        let defender = state
                            .occupant(target)
                            .filter(|d| d.is_enemy_of(&actor))
                            .filter(|_| actor.position.distance(&target) <= actor.attributes.attack_range)
                            .cloned();
                        if let Some(defender) = defender {
                            let dmg = self.damage.attack_damage(&actor, &defender);
                            let mut hit = defender.clone();
                            hit.hp = hit.hp.saturating_sub(dmg.round() as u32);
                            if !hit.is_alive() {
                                resolution.units_defeated += 1;
                            }
                            *state = state.with_unit(hit);
                            resolution.attacks_applied += 1;
                        }
                    }
                    ActionKind::Ability(name) => {
                        let ability = abilities
                            .get(&unit_id)
                            .and_then(|list| list.iter().find(|a| &a.name == name))
                            .filter(|a| actor.mp >= a.mp_cost && actor.position.distance(&target) <= a.range);
                        // Damage lands on enemies only, heals on the caster's own side
                        let target_unit = ability.and_then(|a| {
                            state
                                .occupant(target)
                                .filter(|t| t.is_enemy_of(&actor) == (a.effect == AbilityEffect::Damage))
                                .cloned()
                        });
                        if let (Some(ability), Some(target_unit)) = (ability, target_unit) {
                            let mut affected = target_unit.clone();
                            match ability.effect {
                                AbilityEffect::Damage => {
                                    let dmg = self.damage.expected_damage(
                                        ability.power as f32,
                                        target_unit.attributes.defense as f32,
                                    );
                                    affected.hp = affected.hp.saturating_sub(dmg.round() as u32);
                                    if !affected.is_alive() {
                                        resolution.units_defeated += 1;
                                    }
                                }
                                AbilityEffect::Heal => {
                                    affected.hp = (affected.hp + ability.power).min(affected.max_hp);
                                }
                            }
                            *state = state.with_unit(affected);
                            let mut caster = state.unit(unit_id).cloned().unwrap_or(actor);
                            caster.mp = caster.mp.saturating_sub(ability.mp_cost);
                            *state = state.with_unit(caster);
                            resolution.attacks_applied += 1;
                        }
                    }
                    ActionKind::Defend | ActionKind::Wait => {}
                }
            }
        }

        state.turn += 1;
        resolution
    }
}

impl BattlefieldQuery for LocalBattlefield {
    fn battlefield_state(&self) -> Result<BattlefieldSnapshot, ToolError> {
        self.simulate_latency();
        if self.faults.fail_state.load(Ordering::SeqCst) {
            return Err(ToolError::Unavailable("battlefield state read failed".into()));
        }
        Ok(self.snapshot())
    }

    fn unit_detail(&self, id: UnitId) -> Result<UnitDetail, ToolError> {
        self.simulate_latency();
        if self.faults.fail_detail.load(Ordering::SeqCst) {
            return Err(ToolError::Unavailable(format!("detail read failed for {id}")));
        }
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let view = state.unit(id).cloned().ok_or(ToolError::UnknownUnit(id))?;
        let abilities = self
            .abilities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .unwrap_or_default();
        Ok(UnitDetail {
            view,
            abilities,
            statuses: Vec::new(),
        })
    }

    fn calculate_threat(&self, id: UnitId) -> Result<ThreatScore, ToolError> {
        self.simulate_latency();
        if self.faults.fail_threat.load(Ordering::SeqCst) {
            return Err(ToolError::Unavailable(format!("threat read failed for {id}")));
        }
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let unit = state.unit(id).ok_or(ToolError::UnknownUnit(id))?;
        Ok(ThreatScore {
            unit: id,
            score: estimate_unit_threat(unit, &state, &self.damage),
        })
    }
}

impl UnitCommands for LocalBattlefield {
    fn queue_unit_action(
        &self,
        id: UnitId,
        kind: &ActionKind,
        targets: &[Position],
        priority: u8,
    ) -> bool {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_rejection() {
            return false;
        }
        let alive = self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .unit(id)
            .is_some_and(|u| u.is_alive());
        if !alive {
            return false;
        }
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_default()
            .push(QueuedAction {
                kind: kind.clone(),
                targets: targets.to_vec(),
                priority,
            });
        true
    }

    fn cancel_unit_action(&self, id: UnitId, index: usize) -> bool {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        match queues.get_mut(&id) {
            Some(queue) if index < queue.len() => {
                queue.remove(index);
                true
            }
            _ => false,
        }
    }
}
