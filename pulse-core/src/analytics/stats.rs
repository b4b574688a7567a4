//! Decision statistics.

use crate::decision::Decision;
use crate::types::{Action, StallCategory};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts over a batch of recorded decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionStats {
    pub total: usize,
    pub by_action: BTreeMap<Action, usize>,
    pub by_category: BTreeMap<StallCategory, usize>,
    /// Decisions whose classifier step failed
    pub classification_failures: usize,
    /// Decisions queued without a message because composition failed
    pub composition_failures: usize,
    /// Mean confidence over classified decisions
    pub avg_confidence: Option<f64>,
}

impl DecisionStats {
    pub fn from_decisions(decisions: &[Decision]) -> Self {
        let mut stats = DecisionStats {
            total: decisions.len(),
            ..Default::default()
        };
        let mut confidence_sum = 0.0;
        let mut classified = 0usize;

        for decision in decisions {
            *stats.by_action.entry(decision.action()).or_insert(0) += 1;
            if decision.classification_error().is_some() {
                stats.classification_failures += 1;
            }
            if decision.composition_error().is_some() {
                stats.composition_failures += 1;
            }
            if let Some(c) = decision.classification() {
                *stats.by_category.entry(c.category).or_insert(0) += 1;
                confidence_sum += c.confidence;
                classified += 1;
            }
        }

        if classified > 0 {
            stats.avg_confidence = Some(confidence_sum / classified as f64);
        }
        stats
    }

    /// Classified decisions.
    pub fn classified(&self) -> usize {
        self.by_category.values().sum()
    }

    /// Share of classified decisions that were not benign.
    pub fn non_benign_rate(&self) -> f64 {
        let classified = self.classified();
        if classified == 0 {
            return 0.0;
        }
        let benign = self
            .by_category
            .get(&StallCategory::Benign)
            .copied()
            .unwrap_or(0);
        (classified - benign) as f64 / classified as f64
    }

    pub fn count(&self, action: Action) -> usize {
        self.by_action.get(&action).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{emit, DecisionParts};
    use crate::types::{BackendStatus, Classification, StatusSnapshot};
    use chrono::Utc;

    fn decision(action: Action, classification: Option<(StallCategory, f64)>) -> Decision {
        let gate = if action == Action::SkipUnsafe && classification.is_none() {
            BackendStatus::unavailable("c", "down", Utc::now())
        } else {
            BackendStatus::observed("c", StatusSnapshot::default(), Utc::now())
        };
        emit(DecisionParts {
            conversation_id: "c".to_string(),
            origin_prompt: None,
            gate,
            classification: classification
                .map(|(cat, conf)| Classification::new(cat, conf, "quote").unwrap()),
            classification_error: None,
            action,
            message: None,
            composition_error: None,
        })
        .unwrap()
    }

    #[test]
    fn test_decision_stats() {
        let decisions = vec![
            decision(Action::SkipUnsafe, None),
            decision(Action::SkipBenign, Some((StallCategory::Benign, 0.6))),
            decision(Action::QueueForReview, Some((StallCategory::Confusion, 0.8))),
            decision(Action::SkipLowConfidence, Some((StallCategory::HighFriction, 0.4))),
        ];
        let stats = DecisionStats::from_decisions(&decisions);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.count(Action::SkipUnsafe), 1);
        assert_eq!(stats.count(Action::AutoSend), 0);
        assert_eq!(stats.classified(), 3);
        assert!((stats.avg_confidence.unwrap() - 0.6).abs() < 1e-9);
        assert!((stats.non_benign_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats() {
        let stats = DecisionStats::from_decisions(&[]);
        assert_eq!(stats.total, 0);
        assert!(stats.avg_confidence.is_none());
        assert_eq!(stats.non_benign_rate(), 0.0);
    }
}
