use thiserror::Error;

use crate::controller::ControllerState;
use crate::core::types::UnitId;
use crate::tools::ToolError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Unit not found: {0}")]
    UnknownUnit(UnitId),

    #[error("Decision timed out after {budget_ms} ms")]
    Timeout { budget_ms: u64 },

    #[error("Invalid assignment for unit {unit}: {reason}")]
    InvalidAssignment { unit: UnitId, reason: String },

    #[error("Write rejected for unit {0}")]
    WriteRejected(UnitId),

    #[error("Invalid controller transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ControllerState,
        to: ControllerState,
    },

    #[error("Decision cancelled")]
    Cancelled,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<ToolError> for EngineError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::UnknownUnit(id) => EngineError::UnknownUnit(id),
            other => EngineError::DataUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
