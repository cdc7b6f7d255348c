//! Per-controller decision history and learned action-kind bias

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::battlefield::ActionKind;
use crate::pipeline::DecisionRecord;

/// Records kept per controller
const HISTORY_CAPACITY: usize = 32;
/// Largest score adjustment the learned bias may apply
const MAX_KIND_BIAS: f32 = 0.15;
/// Outcomes needed before a kind's bias is trusted
const MIN_SAMPLES: u32 = 2;

/// Bounded log of committed decisions, oldest dropped first
#[derive(Debug, Clone, Default)]
pub struct DecisionHistory {
    records: VecDeque<DecisionRecord>,
}

impl DecisionHistory {
    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push_back(record);
        while self.records.len() > HISTORY_CAPACITY {
            self.records.pop_front();
        }
    }

    /// Overwrite the newest record, or push when empty
    pub fn replace_latest(&mut self, record: DecisionRecord) {
        match self.records.back_mut() {
            Some(last) => *last = record,
            None => self.records.push_back(record),
        }
    }

    pub fn latest(&self) -> Option<&DecisionRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct KindStats {
    attempts: u32,
    successes: u32,
}

/// Success-rate bias per action category, learned from execution outcomes
#[derive(Debug, Clone, Default)]
pub struct KindBias {
    stats: AHashMap<&'static str, KindStats>,
}

impl KindBias {
    pub fn record(&mut self, kind: &ActionKind, success: bool) {
        let entry = self.stats.entry(kind.category()).or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
    }

    /// Score adjustment in [-MAX_KIND_BIAS, MAX_KIND_BIAS]; 0 until enough samples
    pub fn bias(&self, kind: &ActionKind) -> f32 {
        match self.stats.get(kind.category()) {
            Some(s) if s.attempts >= MIN_SAMPLES => {
                let rate = s.successes as f32 / s.attempts as f32;
                (rate - 0.5) * 2.0 * MAX_KIND_BIAS
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::CandidateAction;
    use crate::core::types::UnitId;

    #[test]
    fn test_history_is_bounded() {
        let mut history = DecisionHistory::default();
        for turn in 0..40 {
            history.push(DecisionRecord::new(UnitId(1), CandidateAction::wait("w"), None, turn));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.latest().map(|r| r.turn), Some(39));
        assert_eq!(history.iter().next().map(|r| r.turn), Some(8));
    }

    #[test]
    fn test_replace_latest_keeps_length() {
        let mut history = DecisionHistory::default();
        history.push(DecisionRecord::new(UnitId(1), CandidateAction::wait("a"), None, 1));
        history.replace_latest(DecisionRecord::new(UnitId(1), CandidateAction::wait("b"), None, 1));
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().map(|r| r.action.rationale.as_str()), Some("b"));
    }

    #[test]
    fn test_bias_needs_samples() {
        let mut bias = KindBias::default();
        bias.record(&ActionKind::Attack, false);
        assert_eq!(bias.bias(&ActionKind::Attack), 0.0);
        bias.record(&ActionKind::Attack, false);
        assert!((bias.bias(&ActionKind::Attack) + MAX_KIND_BIAS).abs() < 1e-6);
    }

    #[test]
    fn test_bias_is_per_category() {
        let mut bias = KindBias::default();
        for _ in 0..3 {
            bias.record(&ActionKind::Ability("bolt".into()), true);
        }
        assert!((bias.bias(&ActionKind::Ability("heal".into())) - MAX_KIND_BIAS).abs() < 1e-6);
        assert_eq!(bias.bias(&ActionKind::Move), 0.0);
    }
}
