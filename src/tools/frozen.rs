//! Read-only adapter over a fixed snapshot
//!
//! Used to evaluate hypothetical states (predicted follow-ups) without
//! touching the host. Writes are not offered.

use std::sync::Arc;

use crate::battlefield::BattlefieldSnapshot;
use crate::core::types::UnitId;
use crate::tactics::{estimate_unit_threat, DamageModel};
use crate::tools::{BattlefieldQuery, ThreatScore, ToolError, UnitDetail};

#[derive(Debug, Clone)]
pub struct FrozenBattlefield {
    snapshot: Arc<BattlefieldSnapshot>,
    damage: DamageModel,
}

impl FrozenBattlefield {
    pub fn new(snapshot: Arc<BattlefieldSnapshot>, damage: DamageModel) -> Self {
        Self { snapshot, damage }
    }
}

impl BattlefieldQuery for FrozenBattlefield {
    fn battlefield_state(&self) -> Result<BattlefieldSnapshot, ToolError> {
        Ok((*self.snapshot).clone())
    }

    /// Abilities are unknown for hypothetical states
    fn unit_detail(&self, id: UnitId) -> Result<UnitDetail, ToolError> {
        let view = self.snapshot.unit(id).cloned().ok_or(ToolError::UnknownUnit(id))?;
        Ok(UnitDetail {
            view,
            abilities: Vec::new(),
            statuses: Vec::new(),
        })
    }

    fn calculate_threat(&self, id: UnitId) -> Result<ThreatScore, ToolError> {
        let unit = self.snapshot.unit(id).ok_or(ToolError::UnknownUnit(id))?;
        Ok(ThreatScore {
            unit: id,
            score: estimate_unit_threat(unit, &self.snapshot, &self.damage),
        })
    }
}
