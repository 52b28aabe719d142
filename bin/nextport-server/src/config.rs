//! Server configuration, loaded from environment variables at startup and
//! optionally overridden from the command line.

use std::path::PathBuf;

use clap::Parser;

/// Runtime configuration for nextport-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set (model calls still need an API key).
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When set, logs go to a daily-rolling file in this directory instead of stdout.
    pub log_dir: Option<PathBuf>,

    /// Anthropic API key.
    pub api_key: String,

    /// Base URL of the Anthropic API.
    pub api_base_url: String,

    /// Model identifier sent with every completion request.
    pub model: String,

    /// Output-token ceiling per completion.
    pub max_tokens: u32,

    /// Per-request timeout for model calls.
    pub upstream_timeout_secs: u64,

    /// Local project served by `GET /fetch`.
    pub reference_dir: PathBuf,

    /// Parent directory of all repo sessions.
    pub work_dir: PathBuf,

    /// How long a zipped session stays downloadable.
    pub session_ttl_secs: u64,

    /// How long a cloned session waits for `/migrate-repo` before it is reaped.
    pub session_idle_ttl_secs: u64,

    /// Interval between reaper passes.
    pub reaper_interval_secs: u64,

    /// Maximum number of live repo sessions.
    pub max_sessions: usize,

    /// Maximum on-disk size of a cloned repository.
    pub max_repo_bytes: u64,

    /// `git` executable used for cloning.
    pub git_program: String,

    /// Comma-separated CORS origin allow-list; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI and the OpenAPI document.
    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("NEXTPORT_BIND", "0.0.0.0:8000"),
            log_level: env_or("NEXTPORT_LOG", "info"),
            log_json: env_flag("NEXTPORT_LOG_JSON", false),
            log_dir: std::env::var("NEXTPORT_LOG_DIR").ok().map(PathBuf::from),
            api_key: std::env::var("NEXTPORT_ANTHROPIC_API_KEY")
                .or_else(|_| std::env::var("CLAUDE_API_KEY"))
                .unwrap_or_default(),
            api_base_url: env_or(
                "NEXTPORT_ANTHROPIC_BASE_URL",
                nextport_core::client::DEFAULT_BASE_URL,
            ),
            model: env_or("NEXTPORT_MODEL", nextport_core::client::DEFAULT_MODEL),
            max_tokens: parse_env(
                "NEXTPORT_MAX_TOKENS",
                nextport_core::client::DEFAULT_MAX_TOKENS,
            ),
            upstream_timeout_secs: parse_env("NEXTPORT_UPSTREAM_TIMEOUT_SECS", 120),
            reference_dir: PathBuf::from(env_or("NEXTPORT_REFERENCE_DIR", "../react-demo")),
            work_dir: std::env::var("NEXTPORT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("nextport")),
            session_ttl_secs: parse_env(
                "NEXTPORT_SESSION_TTL_SECS",
                nextport_core::session::DEFAULT_TTL.as_secs(),
            ),
            session_idle_ttl_secs: parse_env(
                "NEXTPORT_SESSION_IDLE_TTL_SECS",
                nextport_core::session::DEFAULT_IDLE_TTL.as_secs(),
            ),
            reaper_interval_secs: parse_env("NEXTPORT_REAPER_INTERVAL_SECS", 5),
            max_sessions: parse_env(
                "NEXTPORT_MAX_SESSIONS",
                nextport_core::session::DEFAULT_MAX_SESSIONS,
            ),
            max_repo_bytes: parse_env(
                "NEXTPORT_MAX_REPO_BYTES",
                nextport_core::migrate::DEFAULT_MAX_REPO_BYTES,
            ),
            git_program: env_or("NEXTPORT_GIT", "git"),
            cors_allowed_origins: std::env::var("NEXTPORT_CORS_ORIGINS").ok(),
            enable_swagger: env_flag("NEXTPORT_ENABLE_SWAGGER", true),
        }
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_cli(mut self, cli: Cli) -> Self {
        if let Some(bind) = cli.bind {
            self.bind_address = bind;
        }
        if let Some(dir) = cli.work_dir {
            self.work_dir = dir;
        }
        if let Some(dir) = cli.reference_dir {
            self.reference_dir = dir;
        }
        if cli.log_json {
            self.log_json = true;
        }
        self
    }
}

/// Command-line flags. Anything not given here comes from `NEXTPORT_*` variables.
#[derive(Parser, Debug, Default)]
#[command(name = "nextport-server")]
#[command(about = "Convert React components to Next.js App Router components")]
pub struct Cli {
    /// Address to bind, e.g. 127.0.0.1:8000
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory holding repo sessions
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Local project served by GET /fetch
    #[arg(long)]
    pub reference_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cli_overrides_env_values() {
        let cfg = Config::from_env().with_cli(Cli {
            bind: Some("127.0.0.1:9999".into()),
            work_dir: Some(PathBuf::from("/tmp/np")),
            reference_dir: None,
            log_json: true,
        });
        assert_eq!(cfg.bind_address, "127.0.0.1:9999");
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/np"));
        assert!(cfg.log_json);
    }

    #[test]
    fn empty_cli_keeps_env_values() {
        let base = Config::from_env();
        let cfg = base.clone().with_cli(Cli::default());
        assert_eq!(cfg.bind_address, base.bind_address);
        assert_eq!(cfg.reference_dir, base.reference_dir);
    }

    #[test]
    fn parse_env_falls_back_on_garbage() {
        assert_eq!(parse_env("NEXTPORT_TEST_UNSET_VARIABLE", 7u32), 7);
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from(["nextport-server", "--bind", "0.0.0.0:1", "--log-json"]);
        assert_eq!(cli.bind.as_deref(), Some("0.0.0.0:1"));
        assert!(cli.log_json);
        assert!(cli.work_dir.is_none());
    }
}
