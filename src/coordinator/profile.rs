//! Agent profiles
//!
//! Every participant in a coordination pass is an agent: one analyst that
//! reads the battlefield, and one agent per controlled unit. Each carries the
//! set of tool operations it may perform and its own performance counters.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;

use crate::core::types::UnitId;
use crate::tools::ToolOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Analyst,
    Unit,
}

/// Per-agent counters; only the owning task updates them
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AgentStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_time_ms: f64,
}

impl AgentStats {
    pub fn tasks(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    pub fn average_time_ms(&self) -> f64 {
        match self.tasks() {
            0 => 0.0,
            n => self.total_time_ms / n as f64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub name: String,
    pub role: AgentRole,
    pub assigned_units: Vec<UnitId>,
    permissions: BTreeSet<ToolOperation>,
    pub stats: AgentStats,
}

impl AgentProfile {
    /// Read-only agent that gathers the snapshot and threat scores
    pub fn analyst() -> Self {
        Self {
            name: "analyst".into(),
            role: AgentRole::Analyst,
            assigned_units: Vec::new(),
            permissions: ToolOperation::READS.into_iter().collect(),
            stats: AgentStats::default(),
        }
    }

    /// Agent driving one unit; may read and write
    pub fn unit_agent(unit: UnitId) -> Self {
        Self {
            name: format!("unit-{unit}"),
            role: AgentRole::Unit,
            assigned_units: vec![unit],
            permissions: ToolOperation::READS
                .into_iter()
                .chain([ToolOperation::QueueAction, ToolOperation::CancelAction])
                .collect(),
            stats: AgentStats::default(),
        }
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = ToolOperation>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn permits(&self, op: ToolOperation) -> bool {
        self.permissions.contains(&op)
    }

    /// Whether the agent may touch authoritative state at all
    pub fn can_write(&self) -> bool {
        self.permissions.iter().any(|op| op.is_write())
    }

    pub fn permissions(&self) -> impl Iterator<Item = ToolOperation> + '_ {
        self.permissions.iter().copied()
    }

    pub fn record_task(&mut self, success: bool, elapsed: Duration) {
        if success {
            self.stats.tasks_completed += 1;
        } else {
            self.stats.tasks_failed += 1;
        }
        self.stats.total_time_ms += elapsed.as_secs_f64() * 1000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyst_is_read_only() {
        let analyst = AgentProfile::analyst();
        assert!(analyst.permits(ToolOperation::ReadState));
        assert!(analyst.permits(ToolOperation::ReadThreat));
        assert!(!analyst.permits(ToolOperation::QueueAction));
        assert!(!analyst.can_write());
    }

    #[test]
    fn test_unit_agent_reads_and_writes() {
        let agent = AgentProfile::unit_agent(UnitId(3));
        assert_eq!(agent.assigned_units, vec![UnitId(3)]);
        assert!(agent.can_write());
        assert_eq!(agent.permissions().count(), 5);

        let muted = agent.with_permissions(ToolOperation::READS);
        assert!(!muted.can_write());
    }

    #[test]
    fn test_stats_accumulate() {
        let mut agent = AgentProfile::unit_agent(UnitId(1));
        agent.record_task(true, Duration::from_millis(10));
        agent.record_task(false, Duration::from_millis(30));
        assert_eq!(agent.stats.tasks(), 2);
        assert_eq!(agent.stats.tasks_failed, 1);
        assert!((agent.stats.average_time_ms() - 20.0).abs() < 1e-6);
    }
}
