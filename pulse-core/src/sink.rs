//! Record sinks for emitted decisions.

use crate::db::Database;
use crate::decision::Decision;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// Destination for emitted decisions.
///
/// Delivery is at-least-once: an append may be retried with the same
/// decision, and implementations must treat a repeated `decision_id` as a
/// no-op.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, decision: &Decision) -> Result<()>;
}

/// Writes run on the blocking pool, off the runtime workers.
#[async_trait]
impl RecordSink for Database {
    async fn append(&self, decision: &Decision) -> Result<()> {
        let db = self.clone();
        let record = decision.clone();
        let inserted = tokio::task::spawn_blocking(move || db.append_decision(&record))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("sink task failed: {e}"))))??;
        if !inserted {
            tracing::debug!(
                decision_id = decision.decision_id(),
                "Decision already recorded"
            );
        }
        Ok(())
    }
}

/// In-process sink that keeps decisions in memory.
#[derive(Default)]
pub struct MemorySink {
    decisions: Mutex<Vec<Decision>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, in append order.
    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn append(&self, decision: &Decision) -> Result<()> {
        let mut decisions = self.decisions.lock().unwrap();
        if !decisions
            .iter()
            .any(|d| d.decision_id() == decision.decision_id())
        {
            decisions.push(decision.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{emit, DecisionParts};
    use crate::types::{Action, BackendStatus};
    use chrono::Utc;

    fn decision() -> Decision {
        emit(DecisionParts {
            conversation_id: "c-1".to_string(),
            origin_prompt: None,
            gate: BackendStatus::unavailable("c-1", "down", Utc::now()),
            classification: None,
            classification_error: None,
            action: Action::SkipUnsafe,
            message: None,
            composition_error: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_sink_dedupes() {
        let sink = MemorySink::new();
        let d = decision();
        sink.append(&d).await.unwrap();
        sink.append(&d).await.unwrap();
        assert_eq!(sink.decisions().len(), 1);
    }

    #[tokio::test]
    async fn test_database_sink_dedupes() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let d = decision();
        db.append(&d).await.unwrap();
        db.append(&d).await.unwrap();
        assert_eq!(
            db.list_decisions(&Default::default()).unwrap().len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_database_sink_concurrent_appends() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let redelivered = decision();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let sink = db.clone();
            let d = if i % 4 == 0 { redelivered.clone() } else { decision() };
            tasks.spawn(async move { sink.append(&d).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        // 24 distinct decisions plus one redelivered 8 times
        assert_eq!(db.decision_stats().unwrap().total, 25);
    }
}
