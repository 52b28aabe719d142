//! Snippet conversion: prompt, model call, fence extraction.

use std::sync::Arc;

use tracing::debug;

use crate::client::{CompletionClient, CompletionRequest, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::error::Result;
use crate::fence::parse_fence;

const INSTRUCTION: &str = "Convert the following plain React component to a Next.js 13+ component \
using the App Router and TypeScript. Use functional components, `use client` where needed, \
and assume the file is placed under `/app` in a Next.js project. Preserve all props and behavior.";

/// Build the fixed conversion prompt around `code`.
pub fn build_prompt(code: &str) -> String {
    format!("{INSTRUCTION}\n\nReact code:\n```jsx\n{code}\n```")
}

/// Converts React sources to Next.js App Router sources through a model.
#[derive(Clone)]
pub struct Converter {
    client: Arc<dyn CompletionClient>,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            model: DEFAULT_MODEL.to_owned(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert one source string. Sampling is deterministic (temperature 0).
    pub async fn convert(&self, code: &str) -> Result<String> {
        let reply = self
            .client
            .complete(CompletionRequest {
                model: self.model.clone(),
                prompt: build_prompt(code),
                max_tokens: self.max_tokens,
                temperature: 0.0,
            })
            .await?;

        let fence = parse_fence(&reply);
        debug!(?fence, "parsed model reply");
        Ok(fence.into_code(&reply))
    }
}
