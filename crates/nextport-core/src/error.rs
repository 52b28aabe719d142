use thiserror::Error;

use crate::session::SessionStage;

/// Errors that can be returned by nextport-core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An HTTP request to the model API failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The model API answered with a non-2xx status.
    #[error("upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// The model API reply was missing an expected field or had an unexpected shape.
    #[error("invalid upstream response: {message}")]
    InvalidResponse { message: String },

    /// A filesystem I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write the ZIP archive.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A directory walk failed before any file could be visited.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// The caller-supplied repository URL was rejected before cloning.
    #[error("invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    /// `git clone` could not be started or exited unsuccessfully.
    #[error("clone failed: {message}")]
    CloneFailed { message: String },

    /// The cloned repository exceeds the configured size limit.
    #[error("repository is {size} bytes; limit is {limit} bytes")]
    RepoTooLarge { size: u64, limit: u64 },

    /// The referenced session does not exist (never created, failed, or expired).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session is not in the stage the operation requires.
    #[error("session {id} is {actual}, expected {expected}")]
    WrongStage {
        id: String,
        expected: SessionStage,
        actual: SessionStage,
    },

    /// The registry already holds the maximum number of live sessions.
    #[error("too many active sessions (limit {limit})")]
    TooManySessions { limit: usize },

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
