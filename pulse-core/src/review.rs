//! Human review records.
//!
//! Reviews are append-only and reference a [`Decision`] by id. A decision
//! may be reviewed more than once; the most recent review is the effective
//! disposition.

use crate::decision::Decision;
use crate::error::{Error, Result};
use crate::types::{Action, MAX_NUDGE_CHARS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// What the reviewer did with a queued nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDisposition {
    Approved,
    Edited,
    Rejected,
}

impl ReviewDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDisposition::Approved => "approved",
            ReviewDisposition::Edited => "edited",
            ReviewDisposition::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewDisposition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "approved" | "approve" => Ok(ReviewDisposition::Approved),
            "edited" | "edit" => Ok(ReviewDisposition::Edited),
            "rejected" | "reject" => Ok(ReviewDisposition::Rejected),
            _ => Err(format!("unknown review disposition: {}", s)),
        }
    }
}

/// One human disposition of a queued decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub review_id: String,
    pub decision_id: String,
    pub disposition: ReviewDisposition,
    /// Replacement text, only for `edited`
    pub edited_text: Option<String>,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewRecord {
    /// Build a review for a queued decision.
    pub fn new(
        decision: &Decision,
        disposition: ReviewDisposition,
        edited_text: Option<String>,
        reviewer: Option<String>,
        notes: Option<String>,
    ) -> Result<Self> {
        if decision.action() != Action::QueueForReview {
            return Err(Error::InvalidInput(format!(
                "decision {} has action {}; only {} decisions can be reviewed",
                decision.decision_id(),
                decision.action(),
                Action::QueueForReview
            )));
        }

        let edited_text = edited_text.map(|t| t.trim().to_string());
        match (disposition, &edited_text) {
            (ReviewDisposition::Edited, None) => {
                return Err(Error::InvalidInput(
                    "an edited review needs the edited text".to_string(),
                ))
            }
            (ReviewDisposition::Edited, Some(text)) => {
                let len = text.chars().count();
                if len == 0 {
                    return Err(Error::InvalidInput("edited text is empty".to_string()));
                }
                if len > MAX_NUDGE_CHARS {
                    return Err(Error::InvalidInput(format!(
                        "edited text is {len} characters, limit is {MAX_NUDGE_CHARS}"
                    )));
                }
            }
            (_, Some(_)) => {
                return Err(Error::InvalidInput(format!(
                    "edited text is only allowed for {} reviews",
                    ReviewDisposition::Edited
                )))
            }
            (_, None) => {}
        }

        Ok(Self {
            review_id: Uuid::new_v4().to_string(),
            decision_id: decision.decision_id().to_string(),
            disposition,
            edited_text,
            reviewer,
            notes,
            reviewed_at: Utc::now(),
        })
    }
}

/// Counts of effective dispositions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewStats {
    pub total: usize,
    pub approved: usize,
    pub edited: usize,
    pub rejected: usize,
}

impl ReviewStats {
    /// Tally the latest review per decision. Input order is irrelevant.
    pub fn from_records(records: &[ReviewRecord]) -> Self {
        let mut latest: HashMap<&str, &ReviewRecord> = HashMap::new();
        for record in records {
            latest
                .entry(record.decision_id.as_str())
                .and_modify(|current| {
                    if (record.reviewed_at, &record.review_id)
                        > (current.reviewed_at, &current.review_id)
                    {
                        *current = record;
                    }
                })
                .or_insert(record);
        }

        let mut stats = ReviewStats::default();
        for record in latest.values() {
            stats.total += 1;
            match record.disposition {
                ReviewDisposition::Approved => stats.approved += 1,
                ReviewDisposition::Edited => stats.edited += 1,
                ReviewDisposition::Rejected => stats.rejected += 1,
            }
        }
        stats
    }

    /// Share approved without edits.
    pub fn approval_rate(&self) -> f64 {
        ratio(self.approved, self.total)
    }

    /// Share approved or edited.
    pub fn acceptance_rate(&self) -> f64 {
        ratio(self.approved + self.edited, self.total)
    }

    pub fn rejection_rate(&self) -> f64 {
        ratio(self.rejected, self.total)
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
