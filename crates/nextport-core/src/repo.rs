//! Repository acquisition and source-file discovery.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::error::{CoreError, Result};

/// Extensions picked up for conversion (`**/*.js`, `**/*.jsx`, `**/*.ts`, `**/*.tsx`).
pub const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Remote transports only. Local paths and `file://` are never cloned.
const ALLOWED_SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git://"];

/// Places a repository's working tree into a directory.
#[async_trait]
pub trait RepoFetcher: Send + Sync + 'static {
    /// Populate `dest` (which must not exist yet) from `url`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Shallow clone through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: String,
}

impl GitFetcher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl RepoFetcher for GitFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!(%url, dest = %dest.display(), "cloning repository");
        let output = Command::new(&self.program)
            .args(["clone", "--depth", "1", "--quiet", "--"])
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CoreError::CloneFailed {
                message: format!("failed to execute {}: {e}", self.program),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::CloneFailed {
                message: format!("git exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Reject URLs that are empty, look like options, or are not remote git URLs.
pub fn validate_repo_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(CoreError::InvalidRepoUrl("repository URL is empty".into()));
    }
    if url.starts_with('-') {
        return Err(CoreError::InvalidRepoUrl(format!("{url:?} looks like an option")));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidRepoUrl(format!("{url:?} contains whitespace")));
    }

    let scp_like = url
        .strip_prefix("git@")
        .is_some_and(|rest| rest.contains(':'));
    let known_scheme = ALLOWED_SCHEMES
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme));

    if known_scheme || scp_like {
        Ok(())
    } else {
        Err(CoreError::InvalidRepoUrl(format!(
            "{url:?} is not a supported git URL"
        )))
    }
}

pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// List source files under `root` as sorted relative paths.
pub fn discover_sources(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_source_file(entry.path()) {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                files.push(rel.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Total size in bytes of regular files under `root`, `.git` included.
pub fn dir_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Render a relative path with `/` separators regardless of platform.
pub fn to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
