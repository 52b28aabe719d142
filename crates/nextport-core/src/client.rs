//! Completion client seam and the Anthropic Messages API implementation.
//!
//! Everything that talks to a hosted model goes through [`CompletionClient`],
//! so the converter and the batch workflow can run against a canned client in
//! tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A hosted model that turns a prompt into free text.
#[async_trait]
pub trait CompletionClient: Send + Sync + 'static {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Connection settings for [`AnthropicClient`].
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// [`CompletionClient`] backed by `POST /v1/messages`.
pub struct AnthropicClient {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("nextport/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            api_key: config.api_key,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = MessagesBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(CoreError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        let reply: MessagesReply = resp.json().await?;
        let text = first_text(reply)?;
        debug!(model = %request.model, reply_len = text.len(), "completion received");
        Ok(text)
    }
}

fn first_text(reply: MessagesReply) -> Result<String> {
    reply
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| CoreError::InvalidResponse {
            message: "no text block in message content".into(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_text_skips_non_text_blocks() {
        let reply: MessagesReply = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "hello" }
            ]
        }))
        .unwrap();
        assert_eq!(first_text(reply).unwrap(), "hello");
    }

    #[test]
    fn first_text_rejects_empty_content() {
        let reply: MessagesReply = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(
            first_text(reply),
            Err(CoreError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn body_serialises_single_user_message() {
        let body = MessagesBody {
            model: DEFAULT_MODEL,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            messages: [Message {
                role: "user",
                content: "hi",
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], DEFAULT_MODEL);
        assert_eq!(value["max_tokens"], 1000);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client = AnthropicClient::new(AnthropicConfig {
            base_url: "http://localhost:9000/".into(),
            ..AnthropicConfig::default()
        })
        .unwrap();
        assert_eq!(client.endpoint, "http://localhost:9000/v1/messages");
    }
}
