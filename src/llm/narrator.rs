//! Natural-language rationale for executed actions
//!
//! Requests are fire-and-forget from the coordinator's point of view: they
//! run after the turn is resolved, under their own timeout, and a failure
//! only means the unit has no narration.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::AHashMap;
use tracing::{debug, warn};

use crate::battlefield::CandidateAction;
use crate::coordinator::Assignment;
use crate::core::error::{EngineError, Result};
use crate::core::types::{TurnNumber, UnitId};
use crate::llm::ReasoningBackend;

const MAX_TOKENS: u32 = 120;
const TEMPERATURE: f32 = 0.3;

/// What a rationale request describes
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub unit: UnitId,
    pub turn: TurnNumber,
    pub action: CandidateAction,
    pub assignment: Assignment,
}

impl NarrationRequest {
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "Turn {}. Unit {} was ordered to {} and chose to {}",
            self.turn, self.unit, self.assignment, self.action.kind
        );
        if let Some(target) = self.action.target_unit {
            prompt.push_str(&format!(" targeting unit {target}"));
        }
        if let Some(dest) = self.action.move_to {
            prompt.push_str(&format!(" after moving to {dest}"));
        }
        prompt.push_str(&format!(
            " (confidence {:.2}). Engine notes: {}. Explain the choice briefly.",
            self.action.confidence.value(),
            if self.action.rationale.is_empty() { "none" } else { self.action.rationale.as_str() }
        ));
        prompt
    }
}

#[derive(Clone)]
pub struct Narrator {
    backend: Arc<dyn ReasoningBackend>,
    timeout: Duration,
    narrations: Arc<Mutex<AHashMap<UnitId, String>>>,
}

impl Narrator {
    pub fn new(backend: Arc<dyn ReasoningBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            narrations: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Generate and store a rationale; bounded by the narrator's timeout
    pub async fn narrate(&self, request: NarrationRequest) -> Result<String> {
        let prompt = request.prompt();
        let text = tokio::time::timeout(self.timeout, self.backend.generate(&prompt, MAX_TOKENS, TEMPERATURE))
            .await
            .map_err(|_| EngineError::Timeout {
                budget_ms: self.timeout.as_millis() as u64,
            })??;
        let text = text.trim().to_string();
        self.narrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request.unit, text.clone());
        debug!(unit = %request.unit, turn = request.turn, "Rationale stored");
        Ok(text)
    }

    /// Detach a narration onto the runtime; errors are logged and dropped
    pub fn spawn(&self, request: NarrationRequest) -> tokio::task::JoinHandle<()> {
        let narrator = self.clone();
        tokio::spawn(async move {
            let unit = request.unit;
            if let Err(e) = narrator.narrate(request).await {
                warn!(unit = %unit, error = %e, "Rationale unavailable");
            }
        })
    }

    pub fn narration(&self, unit: UnitId) -> Option<String> {
        self.narrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&unit)
            .cloned()
    }
}
