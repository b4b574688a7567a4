//! Decision records.
//!
//! A [`Decision`] is the full audit trail of one pipeline run. It is built
//! once by [`emit`] and has no setters; human dispositions are separate
//! [`crate::review::ReviewRecord`]s that reference it by `decision_id`.

use crate::error::{Error, Result};
use crate::types::{Action, BackendStatus, Classification, NudgeMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    decision_id: String,
    conversation_id: String,
    decided_at: DateTime<Utc>,
    /// Bot turn that preceded the stall
    origin_prompt: Option<String>,
    gate: BackendStatus,
    /// Absent when the gate short-circuited or classification failed
    classification: Option<Classification>,
    classification_error: Option<String>,
    action: Action,
    /// Present only for engagement actions that composed successfully
    message: Option<NudgeMessage>,
    composition_error: Option<String>,
}

/// Everything the pipeline learned during one run.
///
/// Every field must be supplied; use `None` for steps that did not run.
#[derive(Debug, Clone)]
pub struct DecisionParts {
    pub conversation_id: String,
    pub origin_prompt: Option<String>,
    pub gate: BackendStatus,
    pub classification: Option<Classification>,
    pub classification_error: Option<String>,
    pub action: Action,
    pub message: Option<NudgeMessage>,
    pub composition_error: Option<String>,
}

/// Assemble a decision, stamping its id and time.
///
/// Rejects combinations no pipeline run can produce, such as a message on a
/// skip action.
pub fn emit(parts: DecisionParts) -> Result<Decision> {
    if parts.message.is_some() && !parts.action.engages() {
        return Err(Error::InvalidInput(format!(
            "action {} cannot carry a message",
            parts.action
        )));
    }
    if parts.message.is_some() && parts.composition_error.is_some() {
        return Err(Error::InvalidInput(
            "decision has both a message and a composition error".to_string(),
        ));
    }
    if parts.classification.is_some() && parts.classification_error.is_some() {
        return Err(Error::InvalidInput(
            "decision has both a classification and a classification error".to_string(),
        ));
    }
    if parts.action.engages() && parts.classification.is_none() {
        return Err(Error::InvalidInput(format!(
            "action {} requires a classification",
            parts.action
        )));
    }

    Ok(Decision {
        decision_id: Uuid::new_v4().to_string(),
        conversation_id: parts.conversation_id,
        decided_at: Utc::now(),
        origin_prompt: parts.origin_prompt,
        gate: parts.gate,
        classification: parts.classification,
        classification_error: parts.classification_error,
        action: parts.action,
        message: parts.message,
        composition_error: parts.composition_error,
    })
}

impl Decision {
    pub fn decision_id(&self) -> &str {
        &self.decision_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }

    pub fn origin_prompt(&self) -> Option<&str> {
        self.origin_prompt.as_deref()
    }

    pub fn gate(&self) -> &BackendStatus {
        &self.gate
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn classification_error(&self) -> Option<&str> {
        self.classification_error.as_deref()
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn message(&self) -> Option<&NudgeMessage> {
        self.message.as_ref()
    }

    pub fn composition_error(&self) -> Option<&str> {
        self.composition_error.as_deref()
    }
}
