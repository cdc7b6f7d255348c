//! Context fingerprints and decision records

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::battlefield::{BattlefieldSnapshot, CandidateAction, Confidence};
use crate::core::types::{TurnNumber, UnitId};

/// Decision-relevant summary of one unit's context
///
/// Pure function of the unit's resources and how many living opponents sit
/// inside each of its ranges. Positions, turn number and plan assignment are
/// deliberately left out so similar situations share a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextFingerprint {
    pub unit: UnitId,
    pub hp: u32,
    pub mp: u32,
    pub action_points: u32,
    pub enemies_in_attack_range: u16,
    pub enemies_in_reach: u16,
    pub enemies_aware: u16,
}

impl ContextFingerprint {
    /// `None` when the unit is not in the snapshot
    pub fn compute(snapshot: &BattlefieldSnapshot, unit: UnitId, awareness_radius: u32) -> Option<Self> {
        let view = snapshot.unit(unit)?;
        let mut in_range = 0u16;
        let mut in_reach = 0u16;
        let mut aware = 0u16;
        for enemy in snapshot.enemies_of(view.team) {
            let d = view.position.distance(&enemy.position);
            if d <= view.attributes.attack_range {
                in_range = in_range.saturating_add(1);
            }
            if d <= view.reach() {
                in_reach = in_reach.saturating_add(1);
            }
            if d <= awareness_radius {
                aware = aware.saturating_add(1);
            }
        }
        Some(Self {
            unit,
            hp: view.hp,
            mp: view.mp,
            action_points: view.action_points,
            enemies_in_attack_range: in_range,
            enemies_in_reach: in_reach,
            enemies_aware: aware,
        })
    }
}

/// A committed decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub unit: UnitId,
    pub action: CandidateAction,
    pub confidence: Confidence,
    pub fingerprint: Option<ContextFingerprint>,
    pub turn: TurnNumber,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl DecisionRecord {
    pub fn new(
        unit: UnitId,
        action: CandidateAction,
        fingerprint: Option<ContextFingerprint>,
        turn: TurnNumber,
    ) -> Self {
        Self {
            unit,
            confidence: action.confidence,
            action,
            fingerprint,
            turn,
            timestamp_ms: now_ms(),
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
