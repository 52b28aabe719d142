//! Repo sessions: ephemeral working directories with explicit expiry.
//!
//! Every session lives under the registry root as `<root>/<id>/` with
//!
//! - `repo/`         the cloned working tree,
//! - `migrated/`     converted files mirroring `repo/`,
//! - `migrated.zip`  the archive handed to the caller.
//!
//! Cloned sessions get an idle deadline and zipped sessions a download
//! deadline. The reaper task removes expired sessions on a fixed interval,
//! except those currently held by a [`DownloadLease`]; those are removed on
//! the first pass after the last lease is dropped. Sessions mid-clone or
//! mid-migration carry a [`SessionGuard`] instead, which discards them if the
//! owning operation is dropped before finishing.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub const REPO_DIR: &str = "repo";
pub const OUTPUT_DIR: &str = "migrated";
pub const ARCHIVE_NAME: &str = "migrated.zip";

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_SESSIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Cloning,
    Cloned,
    Migrating,
    Zipped,
}

impl SessionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::Cloning => "cloning",
            SessionStage::Cloned => "cloned",
            SessionStage::Migrating => "migrating",
            SessionStage::Zipped => "zipped",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filesystem layout of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub id: String,
    pub root: PathBuf,
    pub repo: PathBuf,
    pub output: PathBuf,
    pub archive: PathBuf,
}

impl SessionPaths {
    fn new(base: &Path, id: String) -> Self {
        let root = base.join(&id);
        Self {
            repo: root.join(REPO_DIR),
            output: root.join(OUTPUT_DIR),
            archive: root.join(ARCHIVE_NAME),
            root,
            id,
        }
    }
}

#[derive(Debug)]
struct Entry {
    paths: SessionPaths,
    stage: SessionStage,
    expires_at: Option<Instant>,
    leases: usize,
}

/// Tracks live sessions, their stages and expiry deadlines.
#[derive(Debug)]
pub struct SessionRegistry {
    base: PathBuf,
    ttl: Duration,
    idle_ttl: Duration,
    max_sessions: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionRegistry {
    pub fn new(base: impl Into<PathBuf>, ttl: Duration, max_sessions: usize) -> Self {
        Self {
            base: base.into(),
            ttl,
            idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// How long a cloned session may wait for `migrate` before it is reaped.
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned map is still structurally valid; keep serving.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a fresh session id in the `Cloning` stage.
    ///
    /// Does not touch the filesystem.
    pub fn reserve(&self) -> Result<SessionPaths> {
        let mut entries = self.lock();
        if entries.len() >= self.max_sessions {
            return Err(CoreError::TooManySessions {
                limit: self.max_sessions,
            });
        }
        let id = Uuid::new_v4().simple().to_string();
        let paths = SessionPaths::new(&self.base, id.clone());
        entries.insert(
            id,
            Entry {
                paths: paths.clone(),
                stage: SessionStage::Cloning,
                expires_at: None,
                leases: 0,
            },
        );
        debug!(id = %paths.id, live = entries.len(), "session reserved");
        Ok(paths)
    }

    pub fn stage(&self, id: &str) -> Option<SessionStage> {
        self.lock().get(id).map(|e| e.stage)
    }

    /// Move `id` from `from` to `to`, failing if it is in any other stage.
    pub fn transition(
        &self,
        id: &str,
        from: SessionStage,
        to: SessionStage,
    ) -> Result<SessionPaths> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| CoreError::SessionNotFound(id.to_owned()))?;
        if entry.stage != from {
            return Err(CoreError::WrongStage {
                id: id.to_owned(),
                expected: from,
                actual: entry.stage,
            });
        }
        entry.stage = to;
        entry.expires_at = match to {
            SessionStage::Cloned => Some(Instant::now() + self.idle_ttl),
            SessionStage::Zipped => Some(Instant::now() + self.ttl),
            SessionStage::Cloning | SessionStage::Migrating => None,
        };
        debug!(%id, %from, %to, "session stage changed");
        Ok(entry.paths.clone())
    }

    /// Finish a migration and start the expiry clock.
    pub fn mark_zipped(&self, id: &str) -> Result<SessionPaths> {
        self.transition(id, SessionStage::Migrating, SessionStage::Zipped)
    }

    /// Hold a zipped session open for a download.
    pub fn lease(self: &Arc<Self>, id: &str) -> Result<DownloadLease> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| CoreError::SessionNotFound(id.to_owned()))?;
        if entry.stage != SessionStage::Zipped {
            return Err(CoreError::WrongStage {
                id: id.to_owned(),
                expected: SessionStage::Zipped,
                actual: entry.stage,
            });
        }
        entry.leases += 1;
        Ok(DownloadLease {
            registry: Arc::clone(self),
            id: id.to_owned(),
            archive: entry.paths.archive.clone(),
        })
    }

    fn release(&self, id: &str) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.leases = entry.leases.saturating_sub(1);
        }
    }

    /// Remove and return every session whose deadline is at or before `now`
    /// and which holds no lease.
    pub fn take_expired(&self, now: Instant) -> Vec<SessionPaths> {
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.leases == 0 && e.expires_at.is_some_and(|t| t <= now))
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|e| e.paths))
            .collect()
    }

    /// Remove every session regardless of state.
    pub fn drain(&self) -> Vec<SessionPaths> {
        self.lock().drain().map(|(_, e)| e.paths).collect()
    }

    fn forget(&self, id: &str) -> Option<SessionPaths> {
        self.lock().remove(id).map(|e| e.paths)
    }

    /// Forget `id` and delete its directory now.
    pub async fn discard(&self, id: &str) {
        if let Some(paths) = self.forget(id) {
            remove_session_dir(&paths).await;
        }
    }

    /// Tie `id` to the lifetime of the returned guard.
    pub fn guard(self: &Arc<Self>, id: &str) -> SessionGuard {
        SessionGuard {
            registry: Arc::clone(self),
            id: id.to_owned(),
            armed: true,
        }
    }
}

/// Discards its session on drop unless [`SessionGuard::disarm`] was called.
///
/// Held across the awaits of a clone or migration so a cancelled request
/// cannot leave a session stuck in `Cloning` or `Migrating`.
#[derive(Debug)]
#[must_use]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: String,
    armed: bool,
}

impl SessionGuard {
    /// The operation finished; keep the session.
    pub fn disarm(mut self) {
        self.armed = false;
    }

    /// The operation failed; delete the session and wait for the directory to go.
    pub async fn discard(mut self) {
        self.armed = false;
        self.registry.discard(&self.id).await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(paths) = self.registry.forget(&self.id) else {
            return;
        };
        warn!(id = %paths.id, "session abandoned mid-operation; discarding");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_session_dir(&paths).await });
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_dir_all(&paths.root) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(id = %paths.id, error = %e, "failed to remove session directory");
                    }
                }
            }
        }
    }
}

async fn remove_session_dir(paths: &SessionPaths) {
    match tokio::fs::remove_dir_all(&paths.root).await {
        Ok(()) => info!(id = %paths.id, "session directory removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(id = %paths.id, error = %e, "failed to remove session directory"),
    }
}

/// Keeps a zipped session from being reaped while it is held.
#[derive(Debug)]
pub struct DownloadLease {
    registry: Arc<SessionRegistry>,
    id: String,
    archive: PathBuf,
}

impl DownloadLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }
}

impl Drop for DownloadLease {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}

/// Delete the directories of all currently expired sessions.
pub async fn reap_once(registry: &SessionRegistry) -> usize {
    let expired = registry.take_expired(Instant::now());
    for paths in &expired {
        remove_session_dir(paths).await;
    }
    expired.len()
}

/// Background task that reaps expired sessions on a fixed interval.
pub struct Reaper {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Reaper {
    pub fn spawn(registry: Arc<SessionRegistry>, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = reap_once(&registry).await;
                        if reaped > 0 {
                            debug!(reaped, live = registry.len(), "reaper pass");
                        }
                    }
                    _ = &mut stopped => break,
                }
            }
            for paths in registry.drain() {
                remove_session_dir(&paths).await;
            }
            info!("session reaper stopped");
        });
        Self { stop, handle }
    }

    /// Stop the reaper and delete all remaining sessions.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "session reaper task failed");
        }
    }
}
