//! Backend activity gate
//!
//! Decides whether a user who is silent on SMS has already acted somewhere
//! else (portal upload, email, phone call). If they have, the stall is
//! resolved and we must not nudge.
//!
//! The gate fails closed: a status source that errors, times out, or is not
//! configured at all produces a status with `safe_to_engage == false`.
//! Results are computed fresh on every call and never cached.

mod http;

pub use http::HttpStatusSource;

use crate::config::{StatusSourceConfig, StatusSourceKind};
use crate::error::{Error, Result};
use crate::types::{BackendStatus, StatusSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Narrow interface onto the CRM/portal system of record.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Report cross-channel activity for one conversation.
    async fn query(&self, conversation_id: &str) -> Result<StatusSnapshot>;
}

/// Status source used when none is configured. Every query fails, so the
/// gate reports every conversation as unsafe.
pub struct UnconfiguredStatusSource;

#[async_trait]
impl StatusSource for UnconfiguredStatusSource {
    async fn query(&self, _conversation_id: &str) -> Result<StatusSnapshot> {
        Err(Error::StatusSource(
            "no status source configured".to_string(),
        ))
    }
}

/// Development status source that reports no activity anywhere.
pub struct AssumeInactiveStatusSource;

#[async_trait]
impl StatusSource for AssumeInactiveStatusSource {
    async fn query(&self, _conversation_id: &str) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot::default())
    }
}

/// Build the status source described by configuration.
pub fn create_status_source(config: &StatusSourceConfig) -> Result<Arc<dyn StatusSource>> {
    config.validate()?;
    match config.kind {
        Some(StatusSourceKind::Http) => Ok(Arc::new(HttpStatusSource::new(config)?)),
        Some(StatusSourceKind::AssumeInactive) => {
            tracing::warn!(
                "status_source.kind = \"assume_inactive\": cross-channel activity is not checked"
            );
            Ok(Arc::new(AssumeInactiveStatusSource))
        }
        None => {
            tracing::warn!("No status source configured; every stall will be skipped as unsafe");
            Ok(Arc::new(UnconfiguredStatusSource))
        }
    }
}

/// Gate that turns a status-source read into a [`BackendStatus`].
#[derive(Clone)]
pub struct BackendActivityGate {
    source: Arc<dyn StatusSource>,
    timeout: Duration,
}

impl BackendActivityGate {
    pub fn new(source: Arc<dyn StatusSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout: timeout.max(Duration::from_millis(1)),
        }
    }

    /// Query the status source, failing closed on any error.
    pub async fn check(&self, conversation_id: &str) -> BackendStatus {
        match self.try_check(conversation_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    error = %e,
                    "Backend status unavailable, failing closed"
                );
                BackendStatus::unavailable(conversation_id, e.to_string(), Utc::now())
            }
        }
    }

    /// Query the status source, surfacing [`Error::GateUnavailable`] on failure.
    pub async fn try_check(&self, conversation_id: &str) -> Result<BackendStatus> {
        if conversation_id.trim().is_empty() {
            return Err(Error::GateUnavailable {
                conversation_id: conversation_id.to_string(),
                message: "empty conversation id".to_string(),
            });
        }

        let snapshot = match tokio::time::timeout(self.timeout, self.source.query(conversation_id))
            .await
        {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                return Err(Error::GateUnavailable {
                    conversation_id: conversation_id.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_elapsed) => {
                return Err(Error::GateUnavailable {
                    conversation_id: conversation_id.to_string(),
                    message: format!("timed out after {}ms", self.timeout.as_millis()),
                })
            }
        };

        let status = BackendStatus::observed(conversation_id, snapshot, Utc::now());
        tracing::debug!(
            conversation_id,
            active_elsewhere = status.active_elsewhere(),
            documents_received = status.documents_received(),
            safe_to_engage = status.safe_to_engage(),
            "Backend status checked"
        );
        Ok(status)
    }
}
