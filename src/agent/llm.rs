//! Client for the external code-generation model.
//!
//! The vendor API is a black box: we send a system prompt plus a user prompt
//! and get text back. Vendors disagree on the response envelope, so the
//! client normalizes both a flat `{"text": ...}` payload and a chat-style
//! message list down to a single string before anyone else sees it.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, MODEL_TIMEOUT_SECS};

/// Seam for the generation model. The orchestrator only ever talks to this
/// trait, so tests inject a scripted fake.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion and return the model's raw text response.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    system: &'a str,
    prompt: &'a str,
}

/// Response envelope, normalized across vendor shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelReply {
    Text { text: String },
    Messages { messages: Vec<ReplyMessage> },
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

impl ModelReply {
    fn into_text(self) -> Result<String> {
        match self {
            Self::Text { text } => Ok(text),
            Self::Messages { messages } => messages
                .into_iter()
                .map(|m| m.content)
                .reduce(|mut acc, c| {
                    acc.push_str(&c);
                    acc
                })
                .ok_or_else(|| anyhow!("Model returned an empty message list")),
        }
    }
}

/// HTTP client against the model vendor's completion endpoint.
pub struct HttpModelClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpModelClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(MODEL_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client for model API")?;
        Ok(Self {
            http,
            api_url: config.model_api_url.clone(),
            api_key: config.model_api_key.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest { system, prompt })
            .send()
            .await
            .context("Model API request failed")?
            .error_for_status()
            .context("Model API returned an error status")?;

        let reply: ModelReply = response
            .json()
            .await
            .context("Failed to decode model API response")?;
        reply.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_text_reply() {
        let reply: ModelReply = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(reply.into_text().unwrap(), "hello");
    }

    #[test]
    fn test_message_list_reply_concatenates() {
        let reply: ModelReply = serde_json::from_str(
            r#"{"messages": [{"content": "part one "}, {"content": "part two"}]}"#,
        )
        .unwrap();
        assert_eq!(reply.into_text().unwrap(), "part one part two");
    }

    #[test]
    fn test_empty_message_list_is_an_error() {
        let reply: ModelReply = serde_json::from_str(r#"{"messages": []}"#).unwrap();
        assert!(reply.into_text().is_err());
    }

    #[test]
    fn test_unknown_envelope_fails_to_parse() {
        assert!(serde_json::from_str::<ModelReply>(r#"{"output": "x"}"#).is_err());
    }
}
