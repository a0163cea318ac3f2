mod database;
mod queue;

pub use database::DatabaseConfig;
pub use queue::QueueConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FixtureError, Result};

/// Environment variable holding the test database URL.
pub const TEST_DATABASE_URL_ENV: &str = "TEST_DATABASE_URL";

/// Environment variable pointing at an existing shared volume.
pub const SHARED_VOLUME_PATH_ENV: &str = "SHARED_VOLUME_PATH";

/// Environment variable holding the log filter for test runs.
pub const LOG_FILTER_ENV: &str = "REANA_FIXTURES_LOG";

/// Root configuration for the fixtures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Shared volume configuration.
    #[serde(default)]
    pub shared_volume: SharedVolumeConfig,

    /// Message queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Secret store configuration.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FixtureConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| FixtureError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| FixtureError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Build configuration from environment variables only.
    ///
    /// Reads `TEST_DATABASE_URL` (never `DATABASE_URL`), `SHARED_VOLUME_PATH`
    /// and `REANA_FIXTURES_LOG`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(TEST_DATABASE_URL_ENV) {
            config.database.url = url;
        }
        if let Ok(path) = std::env::var(SHARED_VOLUME_PATH_ENV) {
            if !path.is_empty() {
                config.shared_volume.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(filter) = std::env::var(LOG_FILTER_ENV) {
            config.logging.enabled = true;
            config.logging.filter = filter;
        }
        config
    }
}

/// Shared volume configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedVolumeConfig {
    /// Existing directory to use as the shared volume. When unset or missing
    /// on disk, a temporary directory is created instead.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Prefix of the temporary directory.
    #[serde(default = "default_volume_prefix")]
    pub temp_prefix: String,
}

impl Default for SharedVolumeConfig {
    fn default() -> Self {
        Self {
            path: None,
            temp_prefix: default_volume_prefix(),
        }
    }
}

fn default_volume_prefix() -> String {
    "reana".to_string()
}

/// Kubernetes secret store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Namespace the secret stores live in.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Prefix of the per-user secret store name.
    #[serde(default = "default_store_prefix")]
    pub store_prefix: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            store_prefix: default_store_prefix(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_store_prefix() -> String {
    "reana-secretsstore-".to_string()
}

/// Logging configuration for test runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Install a subscriber at all.
    #[serde(default)]
    pub enabled: bool,

    /// `EnvFilter` directive.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "reana_fixtures=debug,sqlx=warn".to_string()
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
