//! Configuration loading.
//!
//! Layers, lowest precedence first: built-in defaults, the TOML config file,
//! and `TTYSCRIBE__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::session::{DEFAULT_RETENTION, DEFAULT_SESSIONS_KEY, SessionStoreOptions};
use crate::transcript::{BuilderOptions, DEFAULT_MAX_CONTENT_CHARS, DEFAULT_RECENCY_WINDOW_MS};

pub const APP_NAME: &str = "ttyscribe";

const ENV_PREFIX: &str = "TTYSCRIBE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub transcript: TranscriptConfig,
    pub sessions: SessionsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the file store. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Key the session set is stored under.
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            key: DEFAULT_SESSIONS_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub recency_window_ms: i64,
    /// Per-message content ceiling in characters; 0 disables it.
    pub max_content_chars: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            recency_window_ms: DEFAULT_RECENCY_WINDOW_MS,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Most recently updated sessions kept on every write.
    pub retention: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (or the default location) and the environment.
    ///
    /// A missing file is not an error; an unreadable or invalid one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if path.is_dir() => path.join("config.toml"),
            Some(path) => path.to_path_buf(),
            None => default_config_file()?,
        };

        let built = Config::builder()
            .set_default("logging.level", "info")?
            .add_source(
                File::from(file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("loading config from {}", file.display()))?;

        let config: AppConfig = built
            .try_deserialize()
            .context("deserializing configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.transcript.recency_window_ms < 0 {
            return Err(anyhow!(
                "transcript.recency_window_ms must not be negative (got {})",
                self.transcript.recency_window_ms
            ));
        }
        if self.sessions.retention == 0 {
            return Err(anyhow!("sessions.retention must be at least 1"));
        }
        Ok(())
    }

    /// Directory for the file store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => default_data_dir(),
        }
    }

    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            recency_window: Duration::milliseconds(self.transcript.recency_window_ms),
            max_content_chars: match self.transcript.max_content_chars {
                0 => None,
                n => Some(n),
            },
        }
    }

    pub fn store_options(&self) -> SessionStoreOptions {
        SessionStoreOptions {
            key: self.storage.key.clone(),
            retention: self.sessions.retention,
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config to TOML")
    }
}

/// `<config dir>/ttyscribe/config.toml`.
pub fn default_config_file() -> Result<PathBuf> {
    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir.join("config.toml"));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME).join("config.toml"))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// `<data dir>/ttyscribe`.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}
