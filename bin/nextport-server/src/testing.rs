//! Router-test state: no network, no git.

use std::sync::Arc;

use nextport_core::testing::{CannedClient, FixtureFetcher};
use tempfile::TempDir;

use crate::config::Config;
use crate::state::AppState;

/// State rooted in `dir`: sessions under `dir/work`, reference project under `dir/reference`.
///
/// The model echoes each snippet back with `'use client';` prepended; snippets
/// containing `FAIL` get an upstream error.
pub fn test_state(dir: &TempDir, files: Vec<(&'static str, &'static str)>) -> Arc<AppState> {
    let mut config = Config::from_env();
    config.work_dir = dir.path().join("work");
    config.reference_dir = dir.path().join("reference");
    config.cors_allowed_origins = None;
    config.enable_swagger = true;
    config.max_sessions = 4;
    config.session_ttl_secs = 60;
    std::fs::create_dir_all(&config.work_dir).unwrap();
    std::fs::create_dir_all(&config.reference_dir).unwrap();

    let files = files
        .into_iter()
        .map(|(path, body)| (path, body.as_bytes().to_vec()))
        .collect();

    Arc::new(AppState::new(
        config,
        Arc::new(CannedClient),
        Arc::new(FixtureFetcher { files }),
    ))
}
