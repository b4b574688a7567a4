//! HTTP-backed language oracle for Ollama, Claude, and OpenAI.

use crate::config::{LlmConfig, LlmProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::time::Duration;

use super::{LanguageOracle, OracleRequest};

pub struct HttpLanguageOracle {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpLanguageOracle {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let timeout_secs = config.timeout_secs.max(1);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Oracle(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            http,
        })
    }

    async fn post(&self, provider: &str, url: String, headers: HeaderMap, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Oracle(format!("{provider} request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Oracle(format!("{provider} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Oracle(format!(
                "{provider} returned {}: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl LanguageOracle for HttpLanguageOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String> {
        let base = self.endpoint.trim_end_matches('/');
        match self.provider {
            LlmProvider::Ollama => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                let json = self
                    .post(
                        "ollama",
                        format!("{base}/api/generate"),
                        headers,
                        json!({
                            "model": self.model,
                            "system": request.system,
                            "prompt": request.prompt,
                            "stream": false,
                            "options": {
                                "temperature": request.temperature,
                                "num_predict": request.max_tokens,
                            },
                        }),
                    )
                    .await?;
                json.get("response")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        Error::Oracle("ollama response missing string field `response`".to_string())
                    })
            }
            LlmProvider::Claude => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                        .map_err(|e| Error::Oracle(format!("invalid claude api key header: {e}")))?,
                );
                headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

                let json = self
                    .post(
                        "claude",
                        format!("{base}/v1/messages"),
                        headers,
                        json!({
                            "model": self.model,
                            "max_tokens": request.max_tokens,
                            "temperature": request.temperature,
                            "system": request.system,
                            "messages": [{ "role": "user", "content": request.prompt }],
                        }),
                    )
                    .await?;
                json.get("content")
                    .and_then(|v| v.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|v| v.get("text"))
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
                    .ok_or_else(|| Error::Oracle("claude response missing content[0].text".to_string()))
            }
            LlmProvider::OpenAI => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!(
                        "Bearer {}",
                        self.api_key.as_deref().unwrap_or_default()
                    ))
                    .map_err(|e| Error::Oracle(format!("invalid auth header: {e}")))?,
                );

                let json = self
                    .post(
                        "openai",
                        format!("{base}/v1/chat/completions"),
                        headers,
                        json!({
                            "model": self.model,
                            "temperature": request.temperature,
                            "max_tokens": request.max_tokens,
                            "messages": [
                                { "role": "system", "content": request.system },
                                { "role": "user", "content": request.prompt }
                            ]
                        }),
                    )
                    .await?;
                json.get("choices")
                    .and_then(|v| v.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|v| v.get("message"))
                    .and_then(|v| v.get("content"))
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        Error::Oracle("openai response missing choices[0].message.content".to_string())
                    })
            }
        }
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm_config(provider: LlmProvider, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            model: "test-model".to_string(),
            endpoint: None,
            api_key: api_key.map(ToString::to_string),
            timeout_secs: 30,
            compose_with_oracle: true,
        }
    }

    #[test]
    fn ollama_needs_no_key() {
        let oracle = HttpLanguageOracle::new(&llm_config(LlmProvider::Ollama, None)).unwrap();
        assert_eq!(oracle.model(), Some("test-model"));
        assert_eq!(oracle.endpoint, "http://localhost:11434");
    }

    #[test]
    fn explicit_key_is_used() {
        let oracle =
            HttpLanguageOracle::new(&llm_config(LlmProvider::OpenAI, Some("sk-test"))).unwrap();
        assert_eq!(oracle.api_key.as_deref(), Some("sk-test"));
    }
}
