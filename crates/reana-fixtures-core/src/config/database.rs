use serde::{Deserialize, Serialize};

/// Test database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL. Empty means "not configured".
    #[serde(default)]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// Create the database when it does not exist yet.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    /// PostgreSQL schema holding the platform tables.
    #[serde(default = "default_schema")]
    pub schema: String,
}

impl DatabaseConfig {
    /// Whether a URL has been provided.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
            create_if_missing: true,
            schema: default_schema(),
        }
    }
}

fn default_pool_size() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "__reana".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.pool_timeout_secs, 30);
        assert_eq!(config.schema, "__reana");
        assert!(config.create_if_missing);
        assert!(!config.is_configured());
    }

    #[test]
    fn test_parse_database_config() {
        let toml = r#"
            url = "postgres://localhost/reana_test"
            pool_size = 4
            create_if_missing = false
        "#;

        let config: DatabaseConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pool_size, 4);
        assert!(!config.create_if_missing);
        assert!(config.is_configured());
    }
}
