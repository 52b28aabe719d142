//! Fakes for tests: scripted completion clients and repository fetchers.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature, for
//! dependents that want to drive the workflow without network or `git`.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{CompletionClient, CompletionRequest};
use crate::error::{CoreError, Result};
use crate::repo::RepoFetcher;

/// Echoes the embedded snippet back inside a `tsx` fence.
///
/// Snippets containing `FAIL` produce an upstream error.
pub struct CannedClient;

#[async_trait]
impl CompletionClient for CannedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let snippet = request
            .prompt
            .rsplit_once("```jsx\n")
            .map(|(_, rest)| rest.trim_end_matches("```").trim_end())
            .unwrap_or_default();
        if snippet.contains("FAIL") {
            return Err(CoreError::UpstreamStatus {
                status: 500,
                message: "canned failure".into(),
            });
        }
        Ok(format!(
            "Here is the converted component:\n```tsx\n'use client';\n{snippet}\n```\nLet me know!"
        ))
    }
}

/// Returns a fixed reply and records every request.
pub struct RecordingClient {
    reply: String,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl RecordingClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_owned(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for RecordingClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request);
        }
        Ok(self.reply.clone())
    }
}

/// Never answers; for exercising cancellation.
pub struct StallingClient;

#[async_trait]
impl CompletionClient for StallingClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        std::future::pending().await
    }
}

/// Materialises a fixed file tree instead of cloning.
pub struct FixtureFetcher {
    pub files: Vec<(&'static str, Vec<u8>)>,
}

#[async_trait]
impl RepoFetcher for FixtureFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
        for (rel, bytes) in &self.files {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, bytes).await?;
        }
        Ok(())
    }
}

/// Leaves a partial tree behind and then fails like an aborted clone.
pub struct FailingFetcher;

#[async_trait]
impl RepoFetcher for FailingFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dest).await?;
        tokio::fs::write(dest.join("partial.jsx"), "x").await?;
        Err(CoreError::CloneFailed {
            message: "remote end hung up unexpectedly".into(),
        })
    }
}
