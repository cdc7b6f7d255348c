pub mod config;
pub mod error;
pub mod types;

pub use config::{AnalyzerConfig, CoordinatorConfig, DamageConfig, EngineConfig, PipelineConfig};
pub use error::{EngineError, Result};
pub use types::{GridSize, Position, TeamId, TurnNumber, UnitId};
