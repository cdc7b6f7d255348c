//! Unit Decision Controller
//!
//! Per-unit state machine: gather context, evaluate, commit, execute and
//! keep history. Skill levels change which evaluator features are used.

pub mod cancel;
#[allow(clippy::module_inception)]
pub mod controller;
pub mod memory;
pub mod skill;
pub mod state;

pub use cancel::{CancelCheck, CancellationToken};
pub use controller::{
    ControllerSettings, ControllerStatus, Decision, ExecutionOutcome, ExecutionReport, UnitController,
};
pub use memory::{DecisionHistory, KindBias};
pub use skill::SkillLevel;
pub use state::ControllerState;
