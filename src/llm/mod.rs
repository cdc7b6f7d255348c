//! Optional natural-language reasoning backend
//!
//! Produces human-readable rationale only. Unavailability or slowness never
//! blocks a turn or changes a chosen action.

pub mod client;
pub mod narrator;

use async_trait::async_trait;

use crate::core::error::Result;

pub use client::{ApiFormat, ClientSettings, LlmClient};
pub use narrator::{NarrationRequest, Narrator};

#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}
