//! Configuration types and loading for triage.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::error::Result;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the triage database.
    pub database: PathBuf,

    /// Triage engine tuning.
    pub engine: EngineConfig,

    /// HTTP API listener.
    pub api: ApiConfig,

    /// What `triage seed` creates on an empty database.
    pub seed: SeedConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME);

        Self {
            database: data_dir.join("triage.db"),
            engine: EngineConfig::default(),
            api: ApiConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            let mut config = Self::default();
            config.expand_paths();
            Ok(config)
        }
    }

    /// Load configuration from a specific file, with `TRIAGE__SECTION__KEY`
    /// environment variables taking precedence over the file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(&crate::env_prefix())
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.expand_paths();
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME)
            .join("config.toml")
    }

    /// Save configuration to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure config exists at the given path, creating defaults if missing.
    pub fn ensure_at(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            let mut config = Self::default();
            config.expand_paths();
            config.save_to_path(path)?;
            Ok(config)
        }
    }

    /// Expand a path, replacing ~ with home directory.
    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::full(path)
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_else(|_| path.to_string());
        PathBuf::from(expanded)
    }

    fn expand_paths(&mut self) {
        self.database = Self::expand_path(&self.database.to_string_lossy());
    }
}

/// Tuning for the triage coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts after the first when a write collides with another writer.
    pub max_conflict_retries: u32,

    /// Base delay between conflict retries; grows linearly per attempt.
    pub retry_backoff_ms: u64,

    /// Upper bound for one mutating operation, retries included.
    pub operation_timeout_secs: u64,

    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            retry_backoff_ms: 25,
            operation_timeout_secs: 10,
            busy_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// HTTP API listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Demo data created by the seeder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub default_agents: bool,
    pub canned_templates: bool,
    pub sample_conversations: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            default_agents: true,
            canned_templates: true,
            sample_conversations: true,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
