//! Language oracle interface.
//!
//! The classifier and the composer both talk to a text-in/text-out model
//! through [`LanguageOracle`]. The oracle is opaque: everything that makes
//! its output trustworthy (schema checks, closed category set, length
//! ceiling) lives on our side of the call.

mod http;

pub use http::HttpLanguageOracle;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Completion interface for the classifier and composer.
#[async_trait]
pub trait LanguageOracle: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<String>;

    /// Model identifier recorded on classifications for audit.
    fn model(&self) -> Option<&str> {
        None
    }
}

/// Oracle used when no `[llm]` section is configured. Every call fails, so
/// classification fails and the policy skips the conversation as unsafe.
pub struct UnconfiguredOracle;

#[async_trait]
impl LanguageOracle for UnconfiguredOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String> {
        Err(Error::Oracle("no [llm] section configured".to_string()))
    }
}

/// Create the default HTTP-backed oracle.
pub fn create_oracle(llm: &LlmConfig) -> Result<Arc<dyn LanguageOracle>> {
    Ok(Arc::new(HttpLanguageOracle::new(llm)?))
}

/// Pull the outermost JSON object out of a response that may carry prose or
/// Markdown fences around it.
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Parse a JSON object from oracle output, tolerating surrounding text.
pub(crate) fn parse_json_object(raw: &str) -> std::result::Result<serde_json::Value, String> {
    let parsed = match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(value) => value,
        Err(_) => {
            let extracted = extract_json_object(raw)
                .ok_or_else(|| "response did not contain a JSON object".to_string())?;
            serde_json::from_str::<serde_json::Value>(extracted)
                .map_err(|e| format!("invalid JSON: {e}"))?
        }
    };

    if !parsed.is_object() {
        return Err("response must be a JSON object".to_string());
    }
    Ok(parsed)
}
