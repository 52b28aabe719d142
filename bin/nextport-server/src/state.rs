//! Shared application state injected into every Axum handler.

use std::sync::Arc;
use std::time::Duration;

use nextport_core::{CompletionClient, Converter, Migrator, RepoFetcher, SessionRegistry};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Snippet converter bound to the configured model.
    pub converter: Converter,
    /// Repo-session workflow; owns the session registry.
    pub migrator: Arc<Migrator>,
}

impl AppState {
    /// Wire the converter and migrator from explicit collaborators.
    pub fn new(
        config: Config,
        client: Arc<dyn CompletionClient>,
        fetcher: Arc<dyn RepoFetcher>,
    ) -> Self {
        let converter = Converter::new(client)
            .with_model(config.model.clone())
            .with_max_tokens(config.max_tokens);

        let registry = Arc::new(
            SessionRegistry::new(
                config.work_dir.clone(),
                Duration::from_secs(config.session_ttl_secs),
                config.max_sessions,
            )
            .with_idle_ttl(Duration::from_secs(config.session_idle_ttl_secs)),
        );

        let migrator = Migrator::new(registry, fetcher, converter.clone())
            .with_max_repo_bytes(config.max_repo_bytes);

        Self {
            config: Arc::new(config),
            converter,
            migrator: Arc::new(migrator),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.migrator.registry()
    }
}
