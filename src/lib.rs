//! Skirmish AI - time-boxed tactical decisions for turn-based battles
//!
//! Reads battlefield state through the tool access layer, analyzes it,
//! decides one action per controlled unit inside a fixed turn budget and
//! queues the results back to the host.

pub mod battlefield;
pub mod controller;
pub mod coordinator;
pub mod core;
pub mod llm;
pub mod pipeline;
pub mod strategy;
pub mod tactics;
pub mod tools;
