//! nextport-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables and CLI flags.
//! 2. Initialise structured tracing (JSON or pretty; stdout or rolling file).
//! 3. Prepare the session work directory and the model client.
//! 4. Start the session reaper.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.
//! 6. Stop the reaper, which removes every remaining session.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nextport_core::{AnthropicClient, AnthropicConfig, GitFetcher, Reaper};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::{Cli, Config};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env().with_cli(Cli::parse());

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "nextport-server starting");

    // ── 3. Work directory and collaborators ────────────────────────────────────
    tokio::fs::create_dir_all(&cfg.work_dir).await?;
    info!(work_dir = %cfg.work_dir.display(), "session work directory ready");

    if cfg.api_key.is_empty() {
        warn!("no API key configured (NEXTPORT_ANTHROPIC_API_KEY / CLAUDE_API_KEY); model calls will fail");
    }
    let client = AnthropicClient::new(AnthropicConfig {
        api_key: cfg.api_key.clone(),
        base_url: cfg.api_base_url.clone(),
        timeout: Duration::from_secs(cfg.upstream_timeout_secs),
    })?;
    let fetcher = GitFetcher::new(cfg.git_program.clone());
    info!(model = %cfg.model, max_tokens = cfg.max_tokens, "model client ready");

    let state = Arc::new(AppState::new(cfg.clone(), Arc::new(client), Arc::new(fetcher)));

    // ── 4. Session reaper ──────────────────────────────────────────────────────
    let reaper = Reaper::spawn(
        Arc::clone(state.registry()),
        Duration::from_secs(cfg.reaper_interval_secs.max(1)),
    );
    info!(
        ttl_secs = cfg.session_ttl_secs,
        idle_ttl_secs = cfg.session_idle_ttl_secs,
        max_sessions = cfg.max_sessions,
        "session reaper started"
    );

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 6. Cleanup ─────────────────────────────────────────────────────────────
    reaper.shutdown().await;

    info!("nextport-server stopped");
    Ok(())
}

/// Install the global subscriber. The returned guard must live as long as
/// `main` so buffered file output is flushed.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: NEXTPORT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nextport-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let subscriber = subscriber.with_writer(writer).with_ansi(false);
            if cfg.log_json {
                subscriber.json().init();
            } else {
                subscriber.init();
            }
            Some(guard)
        }
        None => {
            if cfg.log_json {
                subscriber.json().init();
            } else {
                subscriber.init();
            }
            None
        }
    }
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c   => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
