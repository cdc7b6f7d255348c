//! Controller state machine

use serde::Serialize;

use crate::core::error::{EngineError, Result};

/// IDLE → GATHERING_CONTEXT → EVALUATING → DECIDED → EXECUTING → DONE,
/// with FAILED reachable from every state except DONE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    GatheringContext,
    Evaluating,
    Decided,
    Executing,
    Done,
    Failed,
}

impl ControllerState {
    pub fn can_transition_to(self, next: ControllerState) -> bool {
        use ControllerState::*;
        match (self, next) {
            (Idle, GatheringContext)
            | (GatheringContext, Evaluating)
            | (Evaluating, Decided)
            | (Decided, Executing)
            | (Executing, Done) => true,
            (Done, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    /// Validated transition
    pub fn advance(self, next: ControllerState) -> Result<ControllerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(EngineError::InvalidTransition { from: self, to: next })
        }
    }

    /// DONE or FAILED
    pub fn is_terminal(self) -> bool {
        matches!(self, ControllerState::Done | ControllerState::Failed)
    }
}
