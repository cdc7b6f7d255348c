//! Controllers for every unit the coordinator drives
//!
//! The roster is the pipeline's decision source: a live computation locks
//! the unit's controller and runs it, a prediction runs a throwaway
//! controller against the hypothetical snapshot so live state is untouched.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::battlefield::CandidateAction;
use crate::controller::{
    CancellationToken, ControllerSettings, ControllerStatus, Decision, SkillLevel, UnitController,
};
use crate::core::error::Result;
use crate::core::types::UnitId;
use crate::pipeline::{DecisionSource, UnitContext};
use crate::strategy::Archetype;
use crate::tactics::TacticalAnalyzer;
use crate::tools::{BattlefieldQuery, FrozenBattlefield};

struct RosterEntry {
    settings: ControllerSettings,
    controller: Arc<Mutex<UnitController>>,
    /// Latest computed decision awaiting execution
    pending: Mutex<Option<Decision>>,
}

pub struct ControllerRoster {
    query: Arc<dyn BattlefieldQuery>,
    analyzer: Arc<TacticalAnalyzer>,
    defaults: ControllerSettings,
    entries: RwLock<BTreeMap<UnitId, Arc<RosterEntry>>>,
}

impl ControllerRoster {
    pub fn new(query: Arc<dyn BattlefieldQuery>, analyzer: Arc<TacticalAnalyzer>, defaults: ControllerSettings) -> Self {
        Self {
            query,
            analyzer,
            defaults,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn entry(&self, unit: UnitId) -> Arc<RosterEntry> {
        if let Some(entry) = self.entries.read().unwrap_or_else(|e| e.into_inner()).get(&unit) {
            return entry.clone();
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(unit)
            .or_insert_with(|| Arc::new(self.new_entry(unit, self.defaults.clone())))
            .clone()
    }

    fn new_entry(&self, unit: UnitId, settings: ControllerSettings) -> RosterEntry {
        RosterEntry {
            controller: Arc::new(Mutex::new(UnitController::new(unit, settings.clone(), self.analyzer.clone()))),
            settings,
            pending: Mutex::new(None),
        }
    }

    /// Replace the unit's controller with a fresh one of the given kind
    pub fn configure(&self, unit: UnitId, archetype: Archetype, skill: SkillLevel) {
        let settings = ControllerSettings {
            archetype,
            skill,
            ..self.defaults.clone()
        };
        let entry = Arc::new(self.new_entry(unit, settings));
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(unit, entry);
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&unit)
    }

    /// Shared handle to the unit's controller, created on first use
    pub fn controller(&self, unit: UnitId) -> Arc<Mutex<UnitController>> {
        self.entry(unit).controller.clone()
    }

    /// Reset per-turn counters; a controller still busy is left alone
    pub fn begin_turn(&self, unit: UnitId) {
        let entry = self.entry(unit);
        *entry.pending.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Ok(mut controller) = entry.controller.try_lock() {
            controller.begin_turn();
        };
    }

    pub fn take_pending(&self, unit: UnitId) -> Option<Decision> {
        self.entry(unit)
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Status of a known unit; blocks while a computation holds the controller
    pub fn status(&self, unit: UnitId) -> Option<ControllerStatus> {
        let entry = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&unit)
            .cloned()?;
        let controller = entry.controller.lock().unwrap_or_else(|e| e.into_inner());
        Some(controller.status())
    }

    pub fn units(&self) -> Vec<UnitId> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }
}

impl DecisionSource for ControllerRoster {
    fn compute(&self, ctx: &UnitContext, cancel: &CancellationToken) -> Result<CandidateAction> {
        let entry = self.entry(ctx.unit);
        let mut controller = entry.controller.lock().unwrap_or_else(|e| e.into_inner());
        let decision = controller.decide(self.query.as_ref(), ctx.snapshot.as_deref(), ctx.assignment, cancel)?;
        let action = decision.action().clone();
        *entry.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(decision);
        Ok(action)
    }

    fn predict(&self, ctx: &UnitContext) -> Result<CandidateAction> {
        let Some(snapshot) = ctx.snapshot.clone() else {
            return self.compute(ctx, &CancellationToken::new());
        };
        let settings = self.entry(ctx.unit).settings.clone();
        let mut scratch = UnitController::new(ctx.unit, settings, self.analyzer.clone());
        let field = FrozenBattlefield::new(snapshot.clone(), self.analyzer.damage_model().clone());
        let decision = scratch.decide(&field, Some(snapshot.as_ref()), ctx.assignment, &CancellationToken::new())?;
        Ok(decision.action().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::{BattlefieldSnapshot, UnitView};
    use crate::controller::ControllerState;
    use crate::coordinator::Assignment;
    use crate::core::types::{GridSize, Position, TeamId};
    use crate::tools::LocalBattlefield;

    fn roster() -> (Arc<LocalBattlefield>, ControllerRoster) {
        let field = Arc::new(LocalBattlefield::new(BattlefieldSnapshot::new(
            vec![
                UnitView::new(UnitId(1), TeamId(0), Position::new(0, 0)),
                UnitView::new(UnitId(2), TeamId(1), Position::new(0, 1)).with_hp(5, 50),
            ],
            GridSize::new(6, 6),
            1,
        )));
        let roster = ControllerRoster::new(
            field.clone(),
            Arc::new(TacticalAnalyzer::default()),
            ControllerSettings::default(),
        );
        (field, roster)
    }

    #[test]
    fn test_compute_stores_pending_decision() {
        let (field, roster) = roster();
        let ctx = UnitContext::new(UnitId(1), Arc::new(field.snapshot()), Assignment::AttackNearest);
        let action = roster.compute(&ctx, &CancellationToken::new()).unwrap();
        let pending = roster.take_pending(UnitId(1)).unwrap();
        assert_eq!(pending.action(), &action);
        assert!(roster.take_pending(UnitId(1)).is_none());
        assert_eq!(roster.status(UnitId(1)).unwrap().decisions_made, 1);
    }

    #[test]
    fn test_predict_leaves_live_controller_untouched() {
        let (field, roster) = roster();
        let ctx = UnitContext::new(UnitId(1), Arc::new(field.snapshot()), Assignment::AttackNearest);
        roster.predict(&ctx).unwrap();
        assert_eq!(roster.status(UnitId(1)).unwrap().decisions_made, 0);
        assert!(roster.take_pending(UnitId(1)).is_none());
    }

    #[test]
    fn test_begin_turn_resets_idle_controller_only() {
        let (field, roster) = roster();
        let ctx = UnitContext::new(UnitId(1), Arc::new(field.snapshot()), Assignment::AttackNearest);
        roster.compute(&ctx, &CancellationToken::new()).unwrap();
        assert_eq!(roster.status(UnitId(1)).unwrap().state, ControllerState::Decided);

        let busy = roster.controller(UnitId(1));
        {
            let _held = busy.lock().unwrap();
            roster.begin_turn(UnitId(1));
        }
        assert!(roster.take_pending(UnitId(1)).is_none());
        assert_eq!(roster.status(UnitId(1)).unwrap().state, ControllerState::Decided);

        roster.begin_turn(UnitId(1));
        assert_eq!(roster.status(UnitId(1)).unwrap().state, ControllerState::Idle);
    }

    #[test]
    fn test_configure_replaces_controller() {
        let (_field, roster) = roster();
        roster.configure(UnitId(1), Archetype::Aggressive, SkillLevel::Scripted);
        let status = roster.status(UnitId(1)).unwrap();
        assert_eq!(status.archetype, Archetype::Aggressive);
        assert_eq!(status.skill_level, SkillLevel::Scripted);
        assert!(roster.status(UnitId(9)).is_none());
        assert_eq!(roster.units(), vec![UnitId(1)]);
    }
}
