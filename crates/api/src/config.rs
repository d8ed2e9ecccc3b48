use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use buildhub_core::build::BuildCommand;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Bound on waiting for background tasks during shutdown (default: `5`).
    pub shutdown_timeout_secs: u64,
    /// Build pipeline settings.
    pub build: BuildConfig,
}

/// Settings for preparing and running builds.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// One pre-built template project per exercise.
    pub templates_dir: PathBuf,
    /// Parent of the per-job working copies.
    pub builds_dir: PathBuf,
    /// File receiving the submitted source, relative to the template root.
    pub target_file: PathBuf,
    /// Build tool invocation.
    pub command: BuildCommand,
    /// Wall-clock limit per build; `None` disables it.
    pub timeout: Option<Duration>,
    /// Delay between a terminal event and closing its subscribers.
    pub stream_grace: Duration,
    /// How long finished jobs stay queryable.
    pub job_retention: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `5`                     |
    ///
    /// Build settings are read by [`BuildConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_parse("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS", 5),
            build: BuildConfig::from_env(),
        }
    }
}

impl BuildConfig {
    /// | Env Var                | Default                |
    /// |------------------------|------------------------|
    /// | `TEMPLATES_DIR`        | `cached-builds`        |
    /// | `BUILDS_DIR`           | `student-builds`       |
    /// | `TEMPLATE_TARGET_FILE` | `src/NftMarket/NFT.hs` |
    /// | `BUILD_COMMAND`        | `cabal build all`      |
    /// | `BUILD_TIMEOUT_SECS`   | `900` (`0` = no limit) |
    /// | `STREAM_GRACE_MS`      | `100`                  |
    /// | `JOB_RETENTION_SECS`   | `3600`                 |
    pub fn from_env() -> Self {
        let command = match std::env::var("BUILD_COMMAND") {
            Ok(line) => BuildCommand::parse(&line).expect("BUILD_COMMAND must not be blank"),
            Err(_) => BuildCommand::default(),
        };

        let timeout_secs: u64 = env_parse("BUILD_TIMEOUT_SECS", 900);

        Self {
            templates_dir: env_path("TEMPLATES_DIR", "cached-builds"),
            builds_dir: env_path("BUILDS_DIR", "student-builds"),
            target_file: env_path("TEMPLATE_TARGET_FILE", "src/NftMarket/NFT.hs"),
            command,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            stream_grace: Duration::from_millis(env_parse("STREAM_GRACE_MS", 100)),
            job_retention: Duration::from_secs(env_parse("JOB_RETENTION_SECS", 3600)),
        }
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
///
/// Panics on an unparsable value: misconfiguration should fail at startup.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
