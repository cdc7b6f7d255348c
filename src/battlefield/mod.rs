//! Battlefield value types shared by every component

pub mod action;
pub mod snapshot;

pub use action::{ActionKind, CandidateAction, Confidence};
pub use snapshot::{BattlefieldSnapshot, UnitAttributes, UnitView};
