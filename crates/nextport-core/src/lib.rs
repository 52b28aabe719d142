//! Conversion engine behind nextport-server.
//!
//! The model does the actual React → Next.js rewrite; this crate owns the
//! plumbing around it: prompt and reply handling, repository sessions, the
//! batch loop and archival.

pub mod archive;
pub mod client;
pub mod convert;
pub mod error;
pub mod fence;
pub mod migrate;
pub mod repo;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{AnthropicClient, AnthropicConfig, CompletionClient, CompletionRequest};
pub use convert::Converter;
pub use error::CoreError;
pub use fence::{Fence, parse_fence};
pub use migrate::{ClonedRepo, MigrationReport, Migrator, SkippedFile};
pub use repo::{GitFetcher, RepoFetcher};
pub use session::{DownloadLease, Reaper, SessionGuard, SessionRegistry, SessionStage};
