//! Configuration management for vidstats using the prefer crate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::DEFAULT_ERROR_ANSWER;
use crate::llm::LlmConfig;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid pool bounds: min {min}, max {max} (need 1 <= min <= max)")]
    PoolBounds { min: usize, max: usize },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

/// PostgreSQL connection and pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; wins over the individual fields when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Connections opened at startup.
    pub pool_min: usize,
    /// Upper bound on open connections.
    pub pool_max: usize,
    /// Connect over TLS (rustls, native roots).
    pub tls: bool,
    /// Open every session with `default_transaction_read_only=on`.
    pub read_only: bool,
    pub statement_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "videos_stats".to_string(),
            pool_min: 1,
            pool_max: 10,
            tls: false,
            read_only: true,
            statement_timeout_secs: 30,
            acquire_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    fn apply_env(mut self, env: &impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = env("DATABASE_URL") {
            debug!("Using DATABASE_URL from environment");
            self.url = Some(url);
        }
        if let Some(host) = env("POSTGRES_HOST") {
            self.host = host;
        }
        if let Some(port) = env("POSTGRES_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(user) = env("POSTGRES_USER") {
            self.user = user;
        }
        if let Some(password) = env("POSTGRES_PASSWORD") {
            self.password = password;
        }
        if let Some(database) = env("POSTGRES_DB") {
            self.database = database;
        }
        if let Some(n) = env("POSTGRES_POOL_MIN").and_then(|v| v.parse().ok()) {
            self.pool_min = n;
        }
        if let Some(n) = env("POSTGRES_POOL_MAX").and_then(|v| v.parse().ok()) {
            self.pool_max = n;
        }
        if let Some(v) = env("POSTGRES_TLS") {
            self.tls = is_truthy(&v);
        }
        if let Some(v) = env("POSTGRES_READ_ONLY") {
            self.read_only = is_truthy(&v);
        }
        if let Some(secs) = env("POSTGRES_STATEMENT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.statement_timeout_secs = secs;
        }
        if let Some(secs) = env("POSTGRES_ACQUIRE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.acquire_timeout_secs = secs;
        }
        self
    }
}

/// Service-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// The one answer given for every failure.
    pub error_answer: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            error_answer: DEFAULT_ERROR_ANSWER.to_string(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or discover a vidstats config file in
    /// the standard locations when no path is given. Environment variables
    /// are applied on top.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
                Self::load_from_path(Path::new(&expanded)).await?
            }
            None => Self::discover().await,
        };
        Ok(config.with_env_overrides())
    }

    async fn discover() -> Self {
        // Use prefer for file discovery, then parse with serde
        let Ok(found) = prefer::load("vidstats").await else {
            debug!("No config file found, using defaults");
            return Self::default();
        };
        let Some(path) = found.source_path() else {
            return Self::default();
        };
        match Self::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path.
    /// TOML, YAML or JSON, chosen by file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parsed: Result<Config, String> = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
            _ => serde_json::from_str(&contents).map_err(|e| e.to_string()),
        };
        let mut config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply environment variable overrides to every section.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    pub(crate) fn apply_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        self.database = self.database.apply_env(&env);
        self.llm = self.llm.apply_env(&env);
        if let Some(answer) = env("VIDSTATS_ERROR_ANSWER") {
            self.service.error_answer = answer;
        }
        self
    }

    /// Check pool bounds and the credentials the selected backends need.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.database.pool_min, self.database.pool_max);
        if min < 1 || min > max {
            return Err(ConfigError::PoolBounds { min, max });
        }
        if self.database.url.is_none() && self.database.password.is_empty() {
            return Err(ConfigError::MissingCredential("POSTGRES_PASSWORD"));
        }
        if let Some(name) = self.llm.missing_credential() {
            return Err(ConfigError::MissingCredential(name));
        }
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
