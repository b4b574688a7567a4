//! Confidence/action policy
//!
//! Maps a gate result and an optional classification to one [`Action`].
//! Rules are evaluated in order and the first match wins:
//!
//! ```text
//! 1. gate not safe to engage        → skip_unsafe
//! 2. no classification (failed)     → skip_unsafe
//! 3. category is benign             → skip_benign
//! 4. confidence < review_threshold  → skip_low_confidence
//! 5. confidence >= auto_send_threshold
//!    and auto-send enabled          → auto_send
//! 6. otherwise                      → queue_for_review
//! ```
//!
//! [`decide`] is pure: no I/O, no clock, no randomness.

use crate::error::{Error, Result};
use crate::types::{Action, BackendStatus, Classification};
use serde::{Deserialize, Serialize};

/// Per-tenant thresholds and auto-send permission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum confidence for any engagement
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    /// Minimum confidence for sending without human review
    #[serde(default = "default_auto_send_threshold")]
    pub auto_send_threshold: f64,

    /// Whether the tenant permits auto-send at all
    #[serde(default)]
    pub auto_send_enabled: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
            auto_send_threshold: default_auto_send_threshold(),
            auto_send_enabled: false,
        }
    }
}

fn default_review_threshold() -> f64 {
    0.7
}

fn default_auto_send_threshold() -> f64 {
    0.9
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("policy.review_threshold", self.review_threshold),
            ("policy.auto_send_threshold", self.auto_send_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.review_threshold > self.auto_send_threshold {
            return Err(Error::Config(format!(
                "policy.review_threshold ({}) must not exceed policy.auto_send_threshold ({})",
                self.review_threshold, self.auto_send_threshold
            )));
        }
        Ok(())
    }
}

/// Choose the action for one pipeline run.
pub fn decide(
    gate: &BackendStatus,
    classification: Option<&Classification>,
    policy: &PolicyConfig,
) -> Action {
    if !gate.safe_to_engage() {
        return Action::SkipUnsafe;
    }
    let Some(classification) = classification else {
        return Action::SkipUnsafe;
    };
    if classification.category.is_benign() {
        return Action::SkipBenign;
    }
    if classification.confidence < policy.review_threshold {
        return Action::SkipLowConfidence;
    }
    if policy.auto_send_enabled && classification.confidence >= policy.auto_send_threshold {
        return Action::AutoSend;
    }
    Action::QueueForReview
}
