//! HTTP status source for the CRM/portal activity API
//!
//! `GET {endpoint}/conversations/{id}/activity` returning
//! `{"active_elsewhere": bool, "last_activity_at": rfc3339?, "documents_received": bool}`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::config::StatusSourceConfig;
use crate::error::{Error, Result};
use crate::types::StatusSnapshot;

use super::StatusSource;

/// Response body from the activity endpoint
#[derive(Debug, Deserialize)]
struct ActivityResponse {
    #[serde(default, alias = "has_recent_activity")]
    active_elsewhere: bool,
    #[serde(default, alias = "last_activity")]
    last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    documents_received: bool,
}

impl From<ActivityResponse> for StatusSnapshot {
    fn from(r: ActivityResponse) -> Self {
        StatusSnapshot {
            active_elsewhere: r.active_elsewhere,
            last_activity_at: r.last_activity_at,
            documents_received: r.documents_received,
        }
    }
}

/// Status source backed by the CRM/portal HTTP API
pub struct HttpStatusSource {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    /// Create a new status source from configuration
    ///
    /// Returns an error if the endpoint is missing or the API key is not a
    /// valid header value.
    pub fn new(config: &StatusSourceConfig) -> Result<Self> {
        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("status_source.endpoint is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid status_source.api_key: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn activity_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/conversations/{}/activity",
            self.base_url,
            urlencoding::encode(conversation_id)
        )
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn query(&self, conversation_id: &str) -> Result<StatusSnapshot> {
        let url = self.activity_url(conversation_id);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::StatusSource(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let body: ActivityResponse = response
                .json()
                .await
                .map_err(|e| Error::StatusSource(format!("failed to parse response: {}", e)))?;
            Ok(body.into())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::StatusSource(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }
}
