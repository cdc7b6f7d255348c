//! Orchestration Coordinator
//!
//! Runs the per-turn coordination pass over every controlled unit and
//! exposes agent status and performance reports to the host.

#[allow(clippy::module_inception)]
pub mod coordinator;
pub mod plan;
pub mod profile;
pub mod report;
pub mod roster;

pub use coordinator::Coordinator;
pub use plan::{Assignment, BattlePlan, FormationStrategy, Objective};
pub use profile::{AgentProfile, AgentRole, AgentStats};
pub use report::{AgentStatus, PerformanceReport, PhaseTimings, TurnResult, UnitTurnResult};
pub use roster::ControllerRoster;
