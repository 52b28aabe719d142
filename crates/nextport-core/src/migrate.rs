//! Repository migration workflow.
//!
//! [`Migrator::clone_repo`] takes a session from nothing to `Cloned`;
//! [`Migrator::migrate_repo`] runs the per-file conversion loop, zips the
//! output and hands the session to the reaper. Per-file failures are logged
//! and skipped; any other failure, or the caller dropping either future
//! midway, discards the whole session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::archive::zip_dir;
use crate::convert::Converter;
use crate::error::{CoreError, Result};
use crate::repo::{RepoFetcher, dir_size, discover_sources, to_slash, validate_repo_url};
use crate::session::{DownloadLease, SessionPaths, SessionRegistry, SessionStage};

pub const DEFAULT_MAX_REPO_BYTES: u64 = 256 * 1024 * 1024;

/// Result of [`Migrator::clone_repo`].
#[derive(Debug, Clone)]
pub struct ClonedRepo {
    pub id: String,
    /// Matching source files, relative, `/`-separated, sorted.
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub id: String,
    pub converted: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    pub archive: PathBuf,
}

pub struct Migrator {
    registry: Arc<SessionRegistry>,
    fetcher: Arc<dyn RepoFetcher>,
    converter: Converter,
    max_repo_bytes: u64,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("registry", &self.registry)
            .field("converter", &self.converter)
            .field("max_repo_bytes", &self.max_repo_bytes)
            .finish_non_exhaustive()
    }
}

impl Migrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        fetcher: Arc<dyn RepoFetcher>,
        converter: Converter,
    ) -> Self {
        Self {
            registry,
            fetcher,
            converter,
            max_repo_bytes: DEFAULT_MAX_REPO_BYTES,
        }
    }

    pub fn with_max_repo_bytes(mut self, limit: u64) -> Self {
        self.max_repo_bytes = limit;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Clone `url` into a new session and list its source files.
    ///
    /// On any failure the session directory is removed before returning.
    pub async fn clone_repo(&self, url: &str) -> Result<ClonedRepo> {
        let url = url.trim();
        validate_repo_url(url)?;
        let session = self.registry.reserve()?;
        let guard = self.registry.guard(&session.id);

        match self.populate(&session, url).await {
            Ok(files) => {
                self.registry
                    .transition(&session.id, SessionStage::Cloning, SessionStage::Cloned)?;
                guard.disarm();
                info!(id = %session.id, %url, files = files.len(), "repository cloned");
                Ok(ClonedRepo {
                    id: session.id,
                    files,
                })
            }
            Err(e) => {
                warn!(id = %session.id, %url, error = %e, "clone failed; discarding session");
                guard.discard().await;
                Err(e)
            }
        }
    }

    async fn populate(&self, session: &SessionPaths, url: &str) -> Result<Vec<String>> {
        tokio::fs::create_dir_all(&session.root).await?;
        self.fetcher.fetch(url, &session.repo).await?;

        let repo = session.repo.clone();
        let limit = self.max_repo_bytes;
        let files = tokio::task::spawn_blocking(move || {
            let size = dir_size(&repo);
            if size > limit {
                return Err(CoreError::RepoTooLarge { size, limit });
            }
            discover_sources(&repo)
        })
        .await??;

        Ok(files.iter().map(|p| to_slash(p)).collect())
    }

    /// Convert every source file of a cloned session and zip the result.
    pub async fn migrate_repo(&self, id: &str) -> Result<MigrationReport> {
        let session = self
            .registry
            .transition(id, SessionStage::Cloned, SessionStage::Migrating)?;
        let guard = self.registry.guard(id);

        match self.run_batch(&session).await {
            Ok(report) => {
                self.registry.mark_zipped(id)?;
                guard.disarm();
                info!(
                    %id,
                    converted = report.converted.len(),
                    skipped = report.skipped.len(),
                    "migration finished; archive scheduled for deletion"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(%id, error = %e, "migration failed; discarding session");
                guard.discard().await;
                Err(e)
            }
        }
    }

    async fn run_batch(&self, session: &SessionPaths) -> Result<MigrationReport> {
        tokio::fs::create_dir_all(&session.output).await?;

        let repo = session.repo.clone();
        let files = tokio::task::spawn_blocking(move || discover_sources(&repo)).await??;
        info!(id = %session.id, files = files.len(), "migrating repository");

        let mut converted = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();
        for rel in &files {
            let path = to_slash(rel);
            match self.migrate_file(session, rel).await {
                Ok(()) => converted.push(path),
                Err(e) => {
                    warn!(id = %session.id, file = %path, error = %e, "skipping file");
                    skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let output = session.output.clone();
        let archive = session.archive.clone();
        let entries = tokio::task::spawn_blocking(move || zip_dir(&output, &archive)).await??;
        info!(id = %session.id, entries, "archive written");

        Ok(MigrationReport {
            id: session.id.clone(),
            converted,
            skipped,
            archive: session.archive.clone(),
        })
    }

    async fn migrate_file(&self, session: &SessionPaths, rel: &Path) -> Result<()> {
        let source = tokio::fs::read_to_string(session.repo.join(rel)).await?;
        let converted = self.converter.convert(&source).await?;

        let dest = session.output.join(rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, converted).await?;
        Ok(())
    }

    /// Lease the archive of a zipped session for download.
    ///
    /// Sessions that are unknown, not yet zipped, or whose archive file is
    /// gone all report [`CoreError::SessionNotFound`].
    pub async fn open_archive(&self, id: &str) -> Result<DownloadLease> {
        let lease = self.registry.lease(id).map_err(|e| match e {
            CoreError::WrongStage { id, .. } => CoreError::SessionNotFound(id),
            other => other,
        })?;
        if !tokio::fs::try_exists(lease.archive()).await.unwrap_or(false) {
            return Err(CoreError::SessionNotFound(id.to_owned()));
        }
        Ok(lease)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::client::CompletionClient;
    use crate::testing::{CannedClient, FailingFetcher, FixtureFetcher, StallingClient};
    use std::fs::File;
    use std::io::Read;
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn migrator(dir: &TempDir, files: Vec<(&'static str, Vec<u8>)>) -> Migrator {
        let registry = SessionRegistry::new(dir.path(), Duration::from_secs(60), 4);
        migrator_with(registry, Arc::new(CannedClient), files)
    }

    fn migrator_with(
        registry: SessionRegistry,
        client: Arc<dyn CompletionClient>,
        files: Vec<(&'static str, Vec<u8>)>,
    ) -> Migrator {
        Migrator::new(
            Arc::new(registry),
            Arc::new(FixtureFetcher { files }),
            Converter::new(client),
        )
    }

    async fn wait_until_gone(path: &Path) {
        for _ in 0..100 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_owned).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn clone_lists_sources_and_marks_cloned() {
        let dir = TempDir::new().unwrap();
        let m = migrator(
            &dir,
            vec![
                ("src/App.jsx", b"app".to_vec()),
                ("src/index.js", b"index".to_vec()),
                ("README.md", b"readme".to_vec()),
            ],
        );

        let cloned = m.clone_repo("https://github.com/user/repo").await.unwrap();
        assert_eq!(cloned.files, vec!["src/App.jsx", "src/index.js"]);
        assert_eq!(m.registry().stage(&cloned.id), Some(SessionStage::Cloned));
    }

    #[tokio::test]
    async fn invalid_url_leaves_no_session() {
        let dir = TempDir::new().unwrap();
        let m = migrator(&dir, vec![]);

        assert!(matches!(
            m.clone_repo("not a url").await,
            Err(CoreError::InvalidRepoUrl(_))
        ));
        assert!(m.registry().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_clone_removes_session_directory() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(SessionRegistry::new(dir.path(), Duration::from_secs(60), 4));
        let m = Migrator::new(
            registry,
            Arc::new(FailingFetcher),
            Converter::new(Arc::new(CannedClient)),
        );

        assert!(matches!(
            m.clone_repo("https://github.com/user/repo").await,
            Err(CoreError::CloneFailed { .. })
        ));
        assert!(m.registry().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn listed_but_unmigrated_sessions_are_reaped() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(dir.path(), Duration::from_secs(60), 2)
            .with_idle_ttl(Duration::ZERO);
        let m = migrator_with(
            registry,
            Arc::new(CannedClient),
            vec![("App.jsx", b"x".to_vec())],
        );

        let first = m.clone_repo("https://github.com/user/repo").await.unwrap();
        m.clone_repo("https://github.com/user/repo").await.unwrap();
        assert!(matches!(
            m.clone_repo("https://github.com/user/repo").await,
            Err(CoreError::TooManySessions { limit: 2 })
        ));

        assert_eq!(crate::session::reap_once(m.registry()).await, 2);
        assert!(!dir.path().join(&first.id).exists());
        assert!(m.clone_repo("https://github.com/user/repo").await.is_ok());
    }

    #[tokio::test]
    async fn dropped_migration_discards_session() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(dir.path(), Duration::from_secs(60), 4);
        let m = migrator_with(
            registry,
            Arc::new(StallingClient),
            vec![("App.jsx", b"x".to_vec())],
        );
        let cloned = m.clone_repo("https://github.com/user/repo").await.unwrap();

        let attempt =
            tokio::time::timeout(Duration::from_millis(50), m.migrate_repo(&cloned.id)).await;
        assert!(attempt.is_err());

        assert_eq!(m.registry().stage(&cloned.id), None);
        let root = dir.path().join(&cloned.id);
        wait_until_gone(&root).await;
        assert!(!root.exists());
        assert!(matches!(
            m.migrate_repo(&cloned.id).await,
            Err(CoreError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn oversized_repo_is_rejected_and_discarded() {
        let dir = TempDir::new().unwrap();
        let m = migrator(&dir, vec![("App.jsx", vec![b'x'; 64])]).with_max_repo_bytes(10);

        assert!(matches!(
            m.clone_repo("https://github.com/user/repo").await,
            Err(CoreError::RepoTooLarge { size: 64, limit: 10 })
        ));
        assert!(m.registry().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn failing_file_is_skipped_and_rest_are_zipped() {
        let dir = TempDir::new().unwrap();
        let m = migrator(
            &dir,
            vec![
                ("src/A.jsx", b"const A = () => <a />".to_vec()),
                ("src/B.jsx", b"FAIL".to_vec()),
                ("src/nested/C.tsx", b"const C = () => <c />".to_vec()),
                ("src/D.js", vec![0xff, 0xfe, 0x00]),
            ],
        );
        let cloned = m.clone_repo("https://github.com/user/repo").await.unwrap();
        assert_eq!(cloned.files.len(), 4);

        let report = m.migrate_repo(&cloned.id).await.unwrap();
        assert_eq!(report.converted, vec!["src/A.jsx", "src/nested/C.tsx"]);
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(skipped, vec!["src/B.jsx", "src/D.js"]);
        assert!(logs_contain("skipping file"));

        assert_eq!(
            archive_names(&report.archive),
            vec!["src/A.jsx", "src/nested/C.tsx"]
        );
        let mut archive = zip::ZipArchive::new(File::open(&report.archive).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name("src/A.jsx")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "'use client';\nconst A = () => <a />");

        assert_eq!(m.registry().stage(&cloned.id), Some(SessionStage::Zipped));
    }

    #[tokio::test]
    async fn unwritable_output_is_skipped_and_rest_are_zipped() {
        let dir = TempDir::new().unwrap();
        let m = migrator(
            &dir,
            vec![
                ("src/A.jsx", b"const A = () => <a />".to_vec()),
                ("src/Blocked.jsx", b"const B = () => <b />".to_vec()),
                ("src/C.tsx", b"const C = () => <c />".to_vec()),
            ],
        );
        let cloned = m.clone_repo("https://github.com/user/repo").await.unwrap();

        // A directory squatting on the destination makes the write fail.
        let blocked = dir
            .path()
            .join(&cloned.id)
            .join(crate::session::OUTPUT_DIR)
            .join("src/Blocked.jsx");
        std::fs::create_dir_all(&blocked).unwrap();

        let report = m.migrate_repo(&cloned.id).await.unwrap();
        assert_eq!(report.converted, vec!["src/A.jsx", "src/C.tsx"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "src/Blocked.jsx");
        assert_eq!(archive_names(&report.archive), vec!["src/A.jsx", "src/C.tsx"]);
    }

    #[tokio::test]
    async fn migrate_twice_is_a_stage_conflict() {
        let dir = TempDir::new().unwrap();
        let m = migrator(&dir, vec![("App.jsx", b"x".to_vec())]);
        let cloned = m.clone_repo("https://github.com/user/repo").await.unwrap();
        m.migrate_repo(&cloned.id).await.unwrap();

        assert!(matches!(
            m.migrate_repo(&cloned.id).await,
            Err(CoreError::WrongStage {
                actual: SessionStage::Zipped,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn migrate_unknown_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let m = migrator(&dir, vec![]);
        assert!(matches!(
            m.migrate_repo("missing").await,
            Err(CoreError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn open_archive_only_after_zip() {
        let dir = TempDir::new().unwrap();
        let m = migrator(&dir, vec![("App.jsx", b"x".to_vec())]);
        assert!(matches!(
            m.open_archive("missing").await,
            Err(CoreError::SessionNotFound(_))
        ));

        let cloned = m.clone_repo("https://github.com/user/repo").await.unwrap();
        assert!(matches!(
            m.open_archive(&cloned.id).await,
            Err(CoreError::SessionNotFound(_))
        ));

        let report = m.migrate_repo(&cloned.id).await.unwrap();
        let lease = m.open_archive(&cloned.id).await.unwrap();
        assert_eq!(lease.archive(), report.archive.as_path());
    }
}
