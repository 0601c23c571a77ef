use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::LockSettings;

/// Environment variable that overrides the store root directory.
pub const HOME_ENV: &str = "TEAM_AI_HOME";
const ENV_PREFIX: &str = "TEAM_AI";
const DEFAULT_DIR: &str = ".team-ai";
const LOCAL_FILE: &str = "team-ai.toml";
const HOME_FILE: &str = "config.toml";

/// Main configuration structure for team-ai
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TeamAiConfig {
    /// Shared store settings
    pub store: StoreConfig,
    /// Agent liveness settings
    pub agents: AgentConfig,
    /// Inbox polling settings
    pub messaging: MessagingConfig,
    /// Log output settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root; `TEAM_AI_HOME` wins over the files, `~/.team-ai` is the fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Give up waiting for a record lock after this long
    pub lock_timeout_ms: u64,
    /// Initial delay between lock attempts
    pub lock_retry_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Cadence of the `heartbeat` loop
    pub heartbeat_interval_secs: u64,
    /// An agent is active while its last heartbeat is younger than this
    pub liveness_window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Poll interval of `watch`
    pub watch_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter used when neither TEAM_AI_LOG nor RUST_LOG is set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let locks = LockSettings::default();
        Self {
            root: None,
            lock_timeout_ms: locks.timeout.as_millis() as u64,
            lock_retry_ms: locks.retry.as_millis() as u64,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 300,
            // Three missed heartbeats
            liveness_window_secs: 900,
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { watch_interval_secs: 5 }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }
}

impl TeamAiConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `~/.team-ai/config.toml`, then `./team-ai.toml`
    /// 3. Environment variables (`TEAM_AI_STORE__LOCK_TIMEOUT_MS`, ...)
    pub fn load() -> Result<Self> {
        let files = [default_home().join(HOME_FILE), PathBuf::from(LOCAL_FILE)];
        Self::load_from(&files, true)
    }

    /// Layer the given files (missing ones are skipped) and optionally the
    /// environment over the defaults.
    pub fn load_from(files: &[PathBuf], use_env: bool) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&TeamAiConfig::default())?);

        for file in files {
            builder = builder.add_source(File::from(file.as_path()).required(false));
        }

        if use_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: TeamAiConfig = builder.build()?.try_deserialize()?;
        if use_env {
            if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
                config.store.root = Some(PathBuf::from(home));
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agents.heartbeat_interval_secs == 0 {
            anyhow::bail!("agents.heartbeat_interval_secs must be greater than zero");
        }
        if self.agents.liveness_window_secs == 0 {
            anyhow::bail!("agents.liveness_window_secs must be greater than zero");
        }
        if self.messaging.watch_interval_secs == 0 {
            anyhow::bail!("messaging.watch_interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Effective store root: `store.root` (which `TEAM_AI_HOME` overrides
    /// at load time), else `~/.team-ai`.
    pub fn store_root(&self) -> PathBuf {
        self.store.root.clone().unwrap_or_else(default_home)
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            timeout: Duration::from_millis(self.store.lock_timeout_ms),
            retry: Duration::from_millis(self.store.lock_retry_ms.max(1)),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.agents.heartbeat_interval_secs)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.agents.liveness_window_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.messaging.watch_interval_secs)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::debug!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// `$TEAM_AI_HOME`, or `.team-ai` under the user's home directory.
fn default_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR)
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<TeamAiConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = TeamAiConfig::load_env_file();
        TeamAiConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static TeamAiConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
