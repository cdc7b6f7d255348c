//! Coordination results and reports exposed to the host

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::battlefield::CandidateAction;
use crate::controller::{ControllerState, ExecutionReport, SkillLevel};
use crate::coordinator::plan::{Assignment, BattlePlan};
use crate::coordinator::profile::AgentStats;
use crate::core::types::{TurnNumber, UnitId};
use crate::pipeline::{ActionSource, MetricsSnapshot};
use crate::strategy::Archetype;
use crate::tools::ToolOperation;

/// What happened for one requested unit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitTurnResult {
    pub action: CandidateAction,
    pub source: ActionSource,
    pub assignment: Assignment,
    /// The action was changed to resolve a destination conflict
    pub deconflicted: bool,
    /// `None` when no writes were attempted (busy controller or no permission)
    pub execution: Option<ExecutionReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimings {
    pub analyze_ms: f64,
    pub plan_ms: f64,
    pub delegate_ms: f64,
    pub finalize_ms: f64,
}

/// Outcome of one coordination pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub pass_id: Uuid,
    /// Host turn, when a snapshot was obtained
    pub turn: Option<TurnNumber>,
    /// One entry exists per requested unit
    pub success: bool,
    pub per_unit_actions: BTreeMap<UnitId, UnitTurnResult>,
    pub timing_ms: f64,
    pub phases: PhaseTimings,
    /// Units resolved by a real decision / units requested
    pub coordination_quality: f32,
    pub plan: Option<BattlePlan>,
    /// Recovered degradations, in the order they happened
    pub warnings: Vec<String>,
}

impl TurnResult {
    pub fn action(&self, unit: UnitId) -> Option<&CandidateAction> {
        self.per_unit_actions.get(&unit).map(|r| &r.action)
    }

    pub fn len(&self) -> usize {
        self.per_unit_actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_unit_actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub unit: UnitId,
    pub archetype: Archetype,
    pub skill_level: SkillLevel,
    pub decisions_made: u64,
    pub success_rate: f32,
    pub state: ControllerState,
    pub aggression: f32,
    pub risk_tolerance: f32,
    pub planning_horizon: f32,
    pub permissions: Vec<ToolOperation>,
    pub stats: AgentStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub cache_hit_rate: f64,
    pub average_decision_time_ms: f64,
    pub timeout_rate: f64,
    pub parallel_efficiency: f64,
    pub turns: u64,
    pub average_turn_ms: f64,
    pub average_coordination_quality: f64,
    pub pipeline: MetricsSnapshot,
}

/// Running per-pass totals
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TurnStats {
    turns: u64,
    total_ms: f64,
    total_quality: f64,
}

impl TurnStats {
    pub(crate) fn record(&mut self, timing_ms: f64, quality: f32) {
        self.turns += 1;
        self.total_ms += timing_ms;
        self.total_quality += f64::from(quality);
    }

    pub(crate) fn report(&self, pipeline: MetricsSnapshot) -> PerformanceReport {
        let per_turn = |total: f64| if self.turns == 0 { 0.0 } else { total / self.turns as f64 };
        PerformanceReport {
            cache_hit_rate: pipeline.cache_hit_rate,
            average_decision_time_ms: pipeline.average_decision_time_ms,
            timeout_rate: pipeline.timeout_rate,
            parallel_efficiency: pipeline.parallel_efficiency,
            turns: self.turns,
            average_turn_ms: per_turn(self.total_ms),
            average_coordination_quality: per_turn(self.total_quality),
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineMetrics;

    #[test]
    fn test_turn_stats_average() {
        let mut stats = TurnStats::default();
        stats.record(10.0, 1.0);
        stats.record(30.0, 0.5);
        let report = stats.report(PipelineMetrics::default().snapshot());
        assert_eq!(report.turns, 2);
        assert!((report.average_turn_ms - 20.0).abs() < 1e-9);
        assert!((report.average_coordination_quality - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_report_uses_host_field_names() {
        let report = TurnStats::default().report(PipelineMetrics::default().snapshot());
        let json = serde_json::to_value(report).unwrap();
        for key in ["cacheHitRate", "averageDecisionTimeMs", "timeoutRate", "parallelEfficiency"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
